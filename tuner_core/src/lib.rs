#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Tuner landing and parking logic (transport-agnostic).
//!
//! All register access goes through `tuner_traits::HardwareChannel`; every
//! wait goes through `tuner_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Cavity**: identity, immutable channel table, abort latch, exclusivity (`cavity`)
//! - **Stepper**: bounded, abortable moves and signed-count bookkeeping (`stepper`)
//! - **Chirp**: measurement window sizing (`chirp`)
//! - **Auto-tune**: closed-loop convergence on measured detune (`autotune`)
//! - **Landing**: cold-landing and park procedures (`landing`)
//! - **Batch**: parallel runner, calibration report, archive import

pub mod abort;
pub mod atomic;
pub mod autotune;
pub mod cavity;
pub mod chirp;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod import;
pub mod landing;
pub mod linac;
pub mod monitor;
pub mod report;
pub mod runner;
pub mod status;
pub mod stepper;
pub mod util;

pub use abort::AbortToken;
pub use autotune::{AutoTuneLoop, TuneOutcome};
pub use cavity::{
    Cavity, CavityChannels, CavityId, HardwareMode, OperationGuard, StepperPhase,
    TuneConfiguration,
};
pub use chirp::ChirpRangeSelector;
pub use config::{AutoTuneCfg, ChirpCfg, ImportCfg, LandingCfg, StepperCfg};
pub use error::{BuildError, Result, TunerError};
pub use import::{ArchiveSource, CsvArchive, ImportOutcome, SkipReason};
pub use landing::{Lander, LanderBuilder, LandingOutcome, Recorded, Strategy};
pub use monitor::DetuneMonitor;
pub use runner::{CavityReport, Operation, run_many};
pub use status::{LandingStatus, StatusUpdate};
pub use stepper::{MovePlan, StepperController};

use std::sync::Arc;

use tuner_traits::HardwareChannel;

/// Register every cavity of the given cryomodules (all eight, or only
/// `only_cavity`) on one transport.
pub fn cavities_for(
    hw: &Arc<dyn HardwareChannel>,
    cryomodules: &[String],
    only_cavity: Option<u8>,
    steps_per_hz: f64,
) -> Result<Vec<Cavity>> {
    let numbers: Vec<u8> = match only_cavity {
        Some(n) => vec![n],
        None => (1..=linac::CAVITIES_PER_CM).collect(),
    };
    let mut out = Vec::with_capacity(cryomodules.len() * numbers.len());
    for cm in cryomodules {
        for &n in &numbers {
            out.push(Cavity::new(CavityId::new(cm.clone(), n), hw.clone(), steps_per_hz)?);
        }
    }
    Ok(out)
}
