//! Parallel landing across many cavities.
//!
//! One scoped thread per cavity. Cavities share nothing but the transport,
//! so a failure on one never stops the others.

use crate::cavity::{Cavity, CavityId};
use crate::error::{Result, TunerError};
use crate::landing::{Lander, LandingOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ColdLanding,
    Park,
}

impl Operation {
    pub fn run(self, lander: &Lander, cavity: &Cavity, count_current: bool) -> Result<LandingOutcome> {
        match self {
            Self::ColdLanding => lander.move_to_cold_landing(cavity, count_current),
            Self::Park => lander.park(cavity, count_current),
        }
    }
}

/// Result for one cavity of a batch.
#[derive(Debug)]
pub struct CavityReport {
    pub cavity: CavityId,
    pub result: Result<LandingOutcome>,
}

/// Run `op` on every cavity concurrently and collect results in input order.
///
/// Aborts are left latched; acknowledging them is up to the caller.
pub fn run_many(
    lander: &Lander,
    cavities: &[Cavity],
    op: Operation,
    count_current: bool,
) -> Vec<CavityReport> {
    tracing::info!(count = cavities.len(), op = ?op, count_current, "starting batch");
    std::thread::scope(|s| {
        let handles: Vec<_> = cavities
            .iter()
            .map(|cavity| {
                let handle = std::thread::Builder::new()
                    .name(format!("tuner-{}-{}", cavity.id().cryomodule, cavity.id().number))
                    .spawn_scoped(s, move || op.run(lander, cavity, count_current));
                (cavity, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(cavity, handle)| {
                let result = match handle {
                    Ok(h) => h.join().unwrap_or_else(|_| {
                        Err(eyre::Report::new(TunerError::State(format!(
                            "{} worker panicked",
                            cavity.id()
                        ))))
                    }),
                    Err(e) => Err(eyre::Report::new(TunerError::State(format!(
                        "{} worker failed to start: {e}",
                        cavity.id()
                    )))),
                };
                CavityReport {
                    cavity: cavity.id().clone(),
                    result,
                }
            })
            .collect()
    })
}
