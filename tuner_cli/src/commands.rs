//! Command execution: transport assembly, cavity selection, output.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel as xch;
use serde_json::{Value, json};
use tuner_config::Config;
use tuner_core::import::{import_cold_detunes, migrate_park_steps};
use tuner_core::{
    Cavity, CsvArchive, HardwareMode, ImportOutcome, Lander, LandingOutcome, LandingStatus,
    Operation, Recorded, StatusUpdate, TuneConfiguration, cavities_for, linac, report, run_many,
};
use tuner_hardware::{SimulatedChannels, TunerSim, install_cavity};
use tuner_traits::HardwareChannel;

use crate::cli::{Target, json_mode};
use crate::error_fmt;

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Register values for one cavity: `[sim]` defaults, then its override entry.
pub fn seed(sim: &tuner_config::Sim, cm: &str, number: u8) -> TunerSim {
    let base = TunerSim {
        steps_per_hz: sim.steps_per_hz,
        detune_hz: sim.detune_hz,
        tune_config: TuneConfiguration::from(sim.tune_config).code(),
        hw_mode: HardwareMode::from(sim.hw_mode).code(),
        df_cold_hz: sim.df_cold_hz,
        nsteps_cold: sim.nsteps_cold,
        nsteps_park: sim.nsteps_park,
        ..TunerSim::default()
    };
    let Some(o) = sim.cavity(cm, number) else {
        return base;
    };
    TunerSim {
        detune_hz: o.detune_hz.unwrap_or(base.detune_hz),
        df_cold_hz: o.df_cold_hz.unwrap_or(base.df_cold_hz),
        nsteps_cold: o.nsteps_cold.unwrap_or(base.nsteps_cold),
        nsteps_park: o.nsteps_park.unwrap_or(base.nsteps_park),
        step_signed: o.step_signed.unwrap_or(base.step_signed),
        tune_config: o
            .tune_config
            .map(|t| TuneConfiguration::from(t).code())
            .unwrap_or(base.tune_config),
        hw_mode: o
            .hw_mode
            .map(|m| HardwareMode::from(m).code())
            .unwrap_or(base.hw_mode),
        ..base
    }
}

/// Register the selected cavities on a freshly seeded simulated transport.
/// An empty `cms` selects the whole machine.
pub fn open_cavities(cfg: &Config, cms: &[String], only: Option<u8>) -> eyre::Result<Vec<Cavity>> {
    let cms: Vec<String> = if cms.is_empty() {
        linac::all_cryomodules().map(str::to_string).collect()
    } else {
        cms.to_vec()
    };
    let sim = Arc::new(SimulatedChannels::new());
    let hw: Arc<dyn HardwareChannel> = sim.clone();
    let cavities = cavities_for(&hw, &cms, only, cfg.autotune.steps_per_hz)?;
    for c in &cavities {
        install_cavity(&sim, c.prefix(), seed(&cfg.sim, &c.id().cryomodule, c.id().number));
    }
    tracing::debug!(cavities = cavities.len(), "simulated transport ready");
    Ok(cavities)
}

// ── Landing ──────────────────────────────────────────────────────────────────

fn op_name(op: Operation) -> &'static str {
    match op {
        Operation::ColdLanding => "cold",
        Operation::Park => "park",
    }
}

fn recorded_json(r: Recorded) -> Value {
    match r {
        Recorded::Nothing => Value::Null,
        Recorded::StepsToCold(s) => json!({ "register": "NSTEPS_COLD", "value": s }),
        Recorded::StepsToPark(s) => json!({ "register": "NSTEPS_PARK", "value": s }),
        Recorded::ColdDetune(hz) => json!({ "register": "DF_COLD", "value": hz }),
    }
}

fn recorded_text(r: Recorded) -> String {
    match r {
        Recorded::Nothing => String::new(),
        Recorded::StepsToCold(s) => format!(", recorded NSTEPS_COLD = {s}"),
        Recorded::StepsToPark(s) => format!(", recorded NSTEPS_PARK = {s}"),
        Recorded::ColdDetune(hz) => format!(", recorded DF_COLD = {hz:.0} Hz"),
    }
}

fn print_outcome(op: Operation, cavity: &Cavity, result: &eyre::Result<LandingOutcome>) {
    let id = cavity.id();
    if json_mode() {
        let (ok, strategy, config, recorded, error) = match result {
            Ok(out) => (
                true,
                out.strategy.map(|s| Value::from(s.name())).unwrap_or(Value::Null),
                Value::from(out.final_config.to_string()),
                recorded_json(out.recorded),
                Value::Null,
            ),
            Err(e) => (false, Value::Null, Value::Null, Value::Null, error_fmt::error_value(e)),
        };
        println!(
            "{}",
            json!({
                "timestamp": timestamp(),
                "operation": op_name(op),
                "cavity": id.to_string(),
                "cm": id.cryomodule,
                "number": id.number,
                "ok": ok,
                "strategy": strategy,
                "final_config": config,
                "recorded": recorded,
                "error": error,
            })
        );
        return;
    }
    match result {
        Ok(out) => match out.strategy {
            None => println!("{id}: already {}", out.final_config),
            Some(s) => println!(
                "{id}: {} via {} tuning{}",
                out.final_config,
                s.name(),
                recorded_text(out.recorded)
            ),
        },
        Err(e) => println!("{id}: FAILED\n{}", error_fmt::humanize(e)),
    }
}

fn log_status(u: &StatusUpdate) {
    match &u.status {
        LandingStatus::Failed(msg) => tracing::warn!(cavity = %u.cavity, "{msg}"),
        s => tracing::info!(cavity = %u.cavity, "{}", s.message()),
    }
}

/// Run a landing operation on every selected cavity. Returns the exit code.
pub fn run_landing(cfg: &Config, op: Operation, target: &Target) -> eyre::Result<i32> {
    let cavities = Arc::new(open_cavities(cfg, &target.cms, target.cavity)?);

    let on_signal = cavities.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        for c in on_signal.iter() {
            if let Err(e) = c.request_abort() {
                tracing::warn!(cavity = %c.id(), error = %e, "abort request not delivered");
            }
        }
    }) {
        tracing::warn!(error = %e, "Ctrl-C handler not installed");
    }

    let (tx, rx) = xch::unbounded::<StatusUpdate>();
    let printer = std::thread::Builder::new()
        .name("tuner-status".into())
        .spawn(move || rx.iter().for_each(|u| log_status(&u)))?;

    let lander = Lander::builder().apply_config(cfg).with_status(tx).build()?;
    let reports = run_many(&lander, &cavities, op, target.count_current);
    drop(lander);
    if printer.join().is_err() {
        tracing::warn!("status printer panicked");
    }

    let mut code = 0;
    for (report, cavity) in reports.iter().zip(cavities.iter()) {
        print_outcome(op, cavity, &report.result);
        if let Err(e) = &report.result
            && code == 0
        {
            code = error_fmt::exit_code_for_error(e);
        }
    }

    // Reported; acknowledge so the cavities are usable again.
    for c in cavities.iter().filter(|c| c.abort_token().is_requested()) {
        c.clear_abort();
    }
    Ok(code)
}

// ── Maintenance ──────────────────────────────────────────────────────────────

pub fn run_report(cfg: &Config, cms: &[String], csv: Option<&Path>) -> eyre::Result<i32> {
    let cavities = open_cavities(cfg, cms, None)?;
    let rows = report::collect(&cavities);
    if json_mode() {
        println!("{}", serde_json::to_string(&rows)?);
    } else {
        print!("{}", report::render_table(&rows));
    }
    if let Some(path) = csv {
        report::write_csv_file(path, &rows)?;
    }
    Ok(0)
}

pub fn run_import(
    cfg: &Config,
    archive: &Path,
    start_s: f64,
    end_s: f64,
    cms: &[String],
) -> eyre::Result<i32> {
    let cavities = open_cavities(cfg, cms, None)?;
    let source = CsvArchive::load(archive)?;
    let outcomes = import_cold_detunes(&source, &cavities, start_s, end_s, &(&cfg.import).into())?;
    let imported = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, ImportOutcome::Imported(_)))
        .count();
    for (id, outcome) in &outcomes {
        if json_mode() {
            let v = match outcome {
                ImportOutcome::Imported(hz) => json!({ "cavity": id.to_string(), "imported": hz }),
                ImportOutcome::Skipped(r) => {
                    json!({ "cavity": id.to_string(), "skipped": r.to_string() })
                }
            };
            println!("{v}");
        } else {
            match outcome {
                ImportOutcome::Imported(hz) => println!("{id}: DF_COLD = {hz:.0} Hz"),
                ImportOutcome::Skipped(r) => println!("{id}: skipped ({r})"),
            }
        }
    }
    tracing::info!(imported, total = outcomes.len(), "archive import finished");
    Ok(0)
}

pub fn run_migrate(cfg: &Config, cms: &[String]) -> eyre::Result<i32> {
    let cavities = open_cavities(cfg, cms, None)?;
    for (id, steps) in migrate_park_steps(&cavities)? {
        if json_mode() {
            println!("{}", json!({ "cavity": id.to_string(), "nsteps_cold": steps }));
        } else {
            println!("{id}: NSTEPS_COLD = {steps}");
        }
    }
    Ok(0)
}

/// Config already validated by the caller; checks the lander builds and
/// every cavity answers.
pub fn self_check(cfg: &Config) -> eyre::Result<i32> {
    Lander::builder().apply_config(cfg).build()?;
    let cavities = open_cavities(cfg, &[], None)?;
    for c in &cavities {
        c.tune_config()?;
        c.hw_mode()?;
    }
    let cryomodules = linac::all_cryomodules().count();
    if json_mode() {
        println!(
            "{}",
            json!({ "ok": true, "cavities": cavities.len(), "cryomodules": cryomodules, "transport": "sim" })
        );
    } else {
        println!(
            "self-check ok: {} cavities on {cryomodules} cryomodules (simulated transport)",
            cavities.len()
        );
    }
    Ok(0)
}
