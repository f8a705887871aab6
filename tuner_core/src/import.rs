//! Offline calibration maintenance: archive import and register migration.

use std::collections::HashMap;
use std::path::Path;

use tuner_config::ArchiveRow;
use tuner_traits::registers::codes;

use crate::cavity::{Cavity, CavityId};
use crate::config::ImportCfg;
use crate::error::{Result, TunerError};

/// Historical samples for a channel over a time window (unix seconds,
/// inclusive).
pub trait ArchiveSource {
    fn values(&self, channel: &str, start_s: f64, end_s: f64) -> Result<Vec<f64>>;
}

/// Archive backed by an exported CSV.
#[derive(Debug, Default)]
pub struct CsvArchive {
    samples: HashMap<String, Vec<(f64, f64)>>,
}

impl CsvArchive {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_rows(tuner_config::load_archive_csv(path)?))
    }

    pub fn from_rows(rows: Vec<ArchiveRow>) -> Self {
        let mut samples: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
        for r in rows {
            samples
                .entry(r.channel)
                .or_default()
                .push((r.timestamp_s, r.value));
        }
        Self { samples }
    }
}

impl ArchiveSource for CsvArchive {
    fn values(&self, channel: &str, start_s: f64, end_s: f64) -> Result<Vec<f64>> {
        Ok(self
            .samples
            .get(channel)
            .map(|v| {
                v.iter()
                    .filter(|(t, _)| *t >= start_s && *t <= end_s)
                    .map(|(_, x)| *x)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// RF mode was not one steady value over the window.
    RfModeUnsteady { distinct: usize },
    /// RF state was not one steady value over the window.
    RfStateUnsteady { distinct: usize },
    NotChirp { mode: f64 },
    RfOff { state: f64 },
    NoDetuneSamples,
    TooSmall { mean_hz: f64 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RfModeUnsteady { distinct } => write!(f, "RF mode had {distinct} distinct values"),
            Self::RfStateUnsteady { distinct } => {
                write!(f, "RF state had {distinct} distinct values")
            }
            Self::NotChirp { mode } => write!(f, "RF mode {mode} is not chirp"),
            Self::RfOff { state } => write!(f, "RF state {state} is not on"),
            Self::NoDetuneSamples => f.write_str("no detune samples"),
            Self::TooSmall { mean_hz } => write!(f, "mean detune {mean_hz:.0} Hz is implausibly small"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(f64),
    Skipped(SkipReason),
}

fn distinct(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v.dedup();
    v
}

/// Decide what to import for one cavity. Pure; no hardware access.
pub fn evaluate(
    rf_mode: &[f64],
    rf_state: &[f64],
    detune: &[f64],
    cfg: &ImportCfg,
) -> ImportOutcome {
    let modes = distinct(rf_mode);
    if modes.len() != 1 {
        return ImportOutcome::Skipped(SkipReason::RfModeUnsteady {
            distinct: modes.len(),
        });
    }
    let states = distinct(rf_state);
    if states.len() != 1 {
        return ImportOutcome::Skipped(SkipReason::RfStateUnsteady {
            distinct: states.len(),
        });
    }
    if modes[0] != cfg.rf_mode_chirp {
        return ImportOutcome::Skipped(SkipReason::NotChirp { mode: modes[0] });
    }
    if states[0] != codes::RF_ON {
        return ImportOutcome::Skipped(SkipReason::RfOff { state: states[0] });
    }
    if detune.is_empty() {
        return ImportOutcome::Skipped(SkipReason::NoDetuneSamples);
    }
    let mean = detune.iter().sum::<f64>() / detune.len() as f64;
    if mean.abs() < cfg.min_detune_hz {
        return ImportOutcome::Skipped(SkipReason::TooSmall { mean_hz: mean });
    }
    ImportOutcome::Imported(mean)
}

/// Average archived detune over `[start_s, end_s]` and record it as each
/// cavity's cold-landing detune, skipping windows that fail the quality
/// filter.
pub fn import_cold_detunes(
    source: &dyn ArchiveSource,
    cavities: &[Cavity],
    start_s: f64,
    end_s: f64,
    cfg: &ImportCfg,
) -> Result<Vec<(CavityId, ImportOutcome)>> {
    if !(start_s <= end_s) {
        return Err(eyre::Report::new(TunerError::Config(format!(
            "import window start {start_s} is after end {end_s}"
        ))));
    }
    let mut out = Vec::with_capacity(cavities.len());
    for cavity in cavities {
        let ch = cavity.channels();
        let outcome = evaluate(
            &source.values(&ch.rf_mode, start_s, end_s)?,
            &source.values(&ch.rf_state, start_s, end_s)?,
            &source.values(&ch.detune, start_s, end_s)?,
            cfg,
        );
        match &outcome {
            ImportOutcome::Imported(hz) => cavity.set_df_cold(*hz)?,
            ImportOutcome::Skipped(reason) => {
                tracing::warn!(cavity = %cavity.id(), %reason, "skipping cold detune import");
            }
        }
        out.push((cavity.id().clone(), outcome));
    }
    Ok(out)
}

/// Copy the legacy park step count into the cold-landing step count.
pub fn migrate_park_steps(cavities: &[Cavity]) -> Result<Vec<(CavityId, i64)>> {
    cavities
        .iter()
        .map(|cavity| {
            let r = cavity.nsteps_park()?;
            if !r.is_valid() {
                return Err(eyre::Report::new(TunerError::HardwareFault(format!(
                    "{} park step count is invalid",
                    cavity.id()
                ))));
            }
            let steps = r.value.round() as i64;
            cavity.set_nsteps_cold(steps)?;
            Ok((cavity.id().clone(), steps))
        })
        .collect()
}
