use thiserror::Error;

use crate::cavity::{CavityId, HardwareMode, TuneConfiguration};

#[derive(Debug, Error, Clone)]
pub enum TunerError {
    #[error("operation aborted")]
    Aborted,
    #[error("requested move of {requested} steps exceeds limit of {max}")]
    OutOfRange { requested: i64, max: u64 },
    #[error("detune error: {0}")]
    Detune(String),
    #[error("{strategy} tuning not allowed in hardware mode {mode}")]
    HardwareMode {
        mode: HardwareMode,
        strategy: &'static str,
    },
    #[error("step-based landing requires a Resonance baseline, found {found}")]
    ResonanceRequired { found: TuneConfiguration },
    #[error("signed step count did not reset after {attempts} attempts")]
    ResetNotConfirmed { attempts: u32 },
    #[error("{0} already has an operation in flight")]
    Busy(CavityId),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("unknown cryomodule: {0}")]
    UnknownCryomodule(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
