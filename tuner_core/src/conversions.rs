//! `From` implementations bridging `tuner_config` types to `tuner_core` types.

use tuner_config::{HwModeName, TuneConfigName};

use crate::cavity::{HardwareMode, TuneConfiguration};
use crate::config::{AutoTuneCfg, ChirpCfg, ImportCfg, LandingCfg, StepperCfg};

// ── StepperCfg ───────────────────────────────────────────────────────────────

impl From<&tuner_config::Stepper> for StepperCfg {
    fn from(c: &tuner_config::Stepper) -> Self {
        Self {
            max_steps: c.max_steps,
            speed: c.speed,
            move_increment: c.move_increment,
            motion_timeout_ms: c.motion_timeout_ms,
            poll_ms: c.poll_ms,
            reset_attempts: c.reset_attempts,
        }
    }
}

// ── ChirpCfg ─────────────────────────────────────────────────────────────────

impl From<&tuner_config::Chirp> for ChirpCfg {
    fn from(c: &tuner_config::Chirp) -> Self {
        Self {
            guard_band_hz: c.guard_band_hz,
            small_default_hz: c.small_default_hz,
            large_default_hz: c.large_default_hz,
            small_detune_hz: c.small_detune_hz,
        }
    }
}

// ── AutoTuneCfg ──────────────────────────────────────────────────────────────

impl From<&tuner_config::AutoTune> for AutoTuneCfg {
    fn from(c: &tuner_config::AutoTune) -> Self {
        Self {
            tolerance_hz: c.tolerance_hz,
            gain: c.gain,
            max_iterations: c.max_iterations,
            step_overrun_ratio: c.step_overrun_ratio,
            settle_ms: c.settle_ms,
        }
    }
}

// ── LandingCfg ───────────────────────────────────────────────────────────────

impl From<&tuner_config::Config> for LandingCfg {
    fn from(c: &tuner_config::Config) -> Self {
        Self {
            park_detune_hz: c.park.detune_hz,
            monitor_history: c.monitor.history,
            monitor_interval_ms: c.monitor.interval_ms,
        }
    }
}

// ── ImportCfg ────────────────────────────────────────────────────────────────

impl From<&tuner_config::Import> for ImportCfg {
    fn from(c: &tuner_config::Import) -> Self {
        Self {
            min_detune_hz: c.min_detune_hz,
            rf_mode_chirp: f64::from(c.rf_mode_chirp),
        }
    }
}

// ── Register enums ───────────────────────────────────────────────────────────

impl From<TuneConfigName> for TuneConfiguration {
    fn from(n: TuneConfigName) -> Self {
        match n {
            TuneConfigName::Resonance => Self::Resonance,
            TuneConfigName::Cold => Self::Cold,
            TuneConfigName::Parked => Self::Parked,
            TuneConfigName::Other => Self::Other,
        }
    }
}

impl From<HwModeName> for HardwareMode {
    fn from(n: HwModeName) -> Self {
        match n {
            HwModeName::Online => Self::Online,
            HwModeName::Maintenance => Self::Maintenance,
            HwModeName::Offline => Self::Offline,
            HwModeName::MaintenanceDone => Self::MaintenanceDone,
            HwModeName::Ready => Self::Ready,
        }
    }
}
