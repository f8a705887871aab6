//! Human-readable error descriptions and structured JSON error formatting.

use serde_json::{Value, json};
use tuner_core::error::{BuildError, TunerError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/tuner_config.toml for a sample."
            ),
            BuildError::UnknownCryomodule(cm) => format!(
                "What happened: Cryomodule {cm} does not exist.\nLikely causes: Typo in --cm, or a missing leading zero (use 02, not 2).\nHow to fix: Use one of 01..35, H1 or H2."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<TunerError>() {
        return match te {
            TunerError::Aborted => "What happened: The operation was aborted.\nLikely causes: Ctrl-C or an operator abort request.\nHow to fix: The cavity is left in tune configuration Other; check the tuner, then rerun the landing.".to_string(),
            TunerError::OutOfRange { requested, max } => format!(
                "What happened: A move of {requested} steps exceeds the {max} step limit.\nLikely causes: A corrupted recorded step count, or counting from the wrong baseline.\nHow to fix: Check NSTEPS_COLD and the signed step count; raise stepper.max_steps only if the move is genuine."
            ),
            TunerError::Detune(msg) => format!(
                "What happened: Tuning failed ({msg}).\nLikely causes: No valid detune readback (RF off, outside the chirp window) or the tuner is not moving as commanded.\nHow to fix: Check RF and the stepper, then rerun. The cavity is left in tune configuration Other."
            ),
            TunerError::HardwareMode { mode, strategy } => format!(
                "What happened: {strategy} tuning is not allowed while the cavity is in hardware mode {mode}.\nLikely causes: The cavity is offline or not released for tuning.\nHow to fix: Put the cavity in Online or Maintenance (Ready also allows step-based landing) and rerun."
            ),
            TunerError::ResonanceRequired { found } => format!(
                "What happened: Step-based landing needs the cavity at resonance, but it is {found}.\nLikely causes: The tuner was already moved, so the recorded step count no longer applies.\nHow to fix: Rerun with --count-current, or tune to resonance first."
            ),
            TunerError::ResetNotConfirmed { attempts } => format!(
                "What happened: The signed step count did not read back zero after {attempts} reset attempts.\nLikely causes: Stepper controller not responding.\nHow to fix: Check the stepper IOC, or rerun with --count-current."
            ),
            TunerError::Busy(id) => format!(
                "What happened: {id} already has an operation in flight.\nLikely causes: A second landing was started on the same cavity.\nHow to fix: Wait for the running operation to finish."
            ),
            TunerError::Timeout => "What happened: Timed out waiting for the stepper to finish a move.\nLikely causes: Stalled motor, limit switch, or stepper.motion_timeout_ms set too low.\nHow to fix: Check the tuner mechanics and the motion status, then rerun.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();

    if lower.contains("archive csv must have headers") {
        return "Invalid headers in archive CSV. Expected 'channel,timestamp_s,value'.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read ({msg}).\nLikely causes: Wrong --config path.\nHow to fix: Pass --config <FILE> or create etc/tuner_config.toml."
        );
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return format!(
            "What happened: Configuration is invalid ({err:#}).\nLikely causes: Malformed TOML or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; everything else is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<TunerError>() {
        Some(TunerError::Aborted) => 2,
        Some(TunerError::OutOfRange { .. }) => 3,
        Some(TunerError::Detune(_)) => 4,
        Some(TunerError::HardwareMode { .. }) => 5,
        Some(TunerError::ResonanceRequired { .. }) => 6,
        Some(TunerError::Busy(_)) => 7,
        _ => 1,
    }
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    match err.downcast_ref::<TunerError>() {
        Some(TunerError::Aborted) => "Aborted",
        Some(TunerError::OutOfRange { .. }) => "OutOfRange",
        Some(TunerError::Detune(_)) => "Detune",
        Some(TunerError::HardwareMode { .. }) => "HardwareMode",
        Some(TunerError::ResonanceRequired { .. }) => "ResonanceRequired",
        Some(TunerError::ResetNotConfirmed { .. }) => "ResetNotConfirmed",
        Some(TunerError::Busy(_)) => "Busy",
        Some(TunerError::Hardware(_) | TunerError::HardwareFault(_)) => "Hardware",
        Some(TunerError::Timeout) => "Timeout",
        Some(TunerError::Config(_)) => "Config",
        Some(TunerError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured error object; `details` only where the error carries data.
pub fn error_value(err: &eyre::Report) -> Value {
    let details = match err.downcast_ref::<TunerError>() {
        Some(TunerError::OutOfRange { requested, max }) => {
            Some(json!({ "requested": requested, "max": max }))
        }
        Some(TunerError::HardwareMode { mode, strategy }) => {
            Some(json!({ "mode": mode.to_string(), "strategy": strategy }))
        }
        Some(TunerError::ResonanceRequired { found }) => {
            Some(json!({ "found": found.to_string() }))
        }
        Some(TunerError::ResetNotConfirmed { attempts }) => Some(json!({ "attempts": attempts })),
        Some(TunerError::Busy(id)) => Some(json!({ "cavity": id.to_string() })),
        _ => None,
    };
    let reason = reason_name(err);
    let message = humanize(err);
    match details {
        Some(d) => json!({ "reason": reason, "details": d, "message": message }),
        None => json!({ "reason": reason, "message": message }),
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    error_value(err).to_string()
}
