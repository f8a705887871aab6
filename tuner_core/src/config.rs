//! Runtime configuration for the tuner engine.
//!
//! These are the structs the core consumes. They are separate from the
//! TOML-deserialized config in `tuner_config`; see `conversions`.

/// Stepper motion limits and polling.
#[derive(Debug, Clone)]
pub struct StepperCfg {
    /// Largest single move accepted, in steps.
    pub max_steps: u64,
    /// Speed limit written to the motor before each move (steps/s).
    pub speed: u32,
    /// Moves are split into increments of at most this many steps; abort
    /// is honoured between increments.
    pub move_increment: u64,
    pub motion_timeout_ms: u64,
    pub poll_ms: u64,
    /// Bounded retries for the confirmed signed-count reset.
    pub reset_attempts: u32,
}

impl Default for StepperCfg {
    fn default() -> Self {
        Self {
            max_steps: 5_000_000,
            speed: 20_000,
            move_increment: 1_000_000,
            motion_timeout_ms: 10 * 60 * 1000,
            poll_ms: 100,
            reset_attempts: 10,
        }
    }
}

/// Measurement window sizing.
#[derive(Debug, Clone)]
pub struct ChirpCfg {
    pub guard_band_hz: f64,
    pub small_default_hz: f64,
    pub large_default_hz: f64,
    /// Live detune magnitude under which `small_default_hz` is enough.
    pub small_detune_hz: f64,
}

impl Default for ChirpCfg {
    fn default() -> Self {
        Self {
            guard_band_hz: 50_000.0,
            small_default_hz: 200_000.0,
            large_default_hz: 400_000.0,
            small_detune_hz: 150_000.0,
        }
    }
}

/// Feedback loop tuning.
#[derive(Debug, Clone)]
pub struct AutoTuneCfg {
    pub tolerance_hz: f64,
    /// Fraction of the estimated correction applied per move.
    pub gain: f64,
    pub max_iterations: u32,
    /// Cumulative steps may not exceed this multiple of the first estimate.
    pub step_overrun_ratio: f64,
    pub settle_ms: u64,
}

impl Default for AutoTuneCfg {
    fn default() -> Self {
        Self {
            tolerance_hz: 50.0,
            gain: 0.9,
            max_iterations: 30,
            step_overrun_ratio: 1.1,
            settle_ms: 5_000,
        }
    }
}

/// Landing/park procedure parameters.
#[derive(Debug, Clone)]
pub struct LandingCfg {
    /// Detune the park operation tunes to.
    pub park_detune_hz: f64,
    /// Readings kept by the detune monitor while a landing runs.
    pub monitor_history: usize,
    /// Spacing of the detune polls that fill the history before setup.
    pub monitor_interval_ms: u64,
}

impl Default for LandingCfg {
    fn default() -> Self {
        Self {
            park_detune_hz: 10_000.0,
            monitor_history: 8,
            monitor_interval_ms: 100,
        }
    }
}

/// Archive import filter.
#[derive(Debug, Clone)]
pub struct ImportCfg {
    pub min_detune_hz: f64,
    pub rf_mode_chirp: f64,
}

impl Default for ImportCfg {
    fn default() -> Self {
        Self {
            min_detune_hz: 3_000.0,
            rf_mode_chirp: tuner_traits::registers::codes::RF_MODE_CHIRP,
        }
    }
}
