#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and CSV formats for the tuner tooling.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Archive CSV loader enforces headers (`channel,timestamp_s,value`).
//! - Report CSV writer emits one row per cavity.
use serde::{Deserialize, Serialize};

// ── Stepper ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Stepper {
    /// Largest single move accepted, in steps.
    pub max_steps: u64,
    /// Motor speed limit (steps/s) written before every move.
    pub speed: u32,
    /// Moves are issued in increments of at most this many steps.
    pub move_increment: u64,
    /// Give up waiting for one increment to finish after this long.
    pub motion_timeout_ms: u64,
    /// Motion-state and abort polling interval.
    pub poll_ms: u64,
    /// Bounded retries for the signed-count reset.
    pub reset_attempts: u32,
}

impl Default for Stepper {
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

// ── Chirp ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Chirp {
    /// Margin added around a detune estimate.
    pub guard_band_hz: f64,
    /// Fallback window when the live detune is usable and already small.
    pub small_default_hz: f64,
    /// Fallback window otherwise.
    pub large_default_hz: f64,
    /// Live detune magnitude below which the small window is used.
    pub small_detune_hz: f64,
}

impl Default for Chirp {
    fn default() -> Self {
        Self {
            guard_band_hz: 50_000.0,
            small_default_hz: 200_000.0,
            large_default_hz: 400_000.0,
            small_detune_hz: 150_000.0,
        }
    }
}

// ── AutoTune ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutoTune {
    pub tolerance_hz: f64,
    /// Fraction of the estimated correction applied per iteration.
    pub gain: f64,
    pub max_iterations: u32,
    /// Fail once cumulative steps exceed this multiple of the initial estimate.
    pub step_overrun_ratio: f64,
    /// Wait after each move before re-measuring.
    pub settle_ms: u64,
    pub steps_per_hz: f64,
}

impl Default for AutoTune {
    fn default() -> Self {
        Self {
            tolerance_hz: 50.0,
            gain: 0.9,
            max_iterations: 30,
            step_overrun_ratio: 1.1,
            settle_ms: 5_000,
            steps_per_hz: 1.4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Park {
    pub detune_hz: f64,
}

impl Default for Park {
    fn default() -> Self {
        Self { detune_hz: 10_000.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Import {
    /// Averaged detunes with a smaller magnitude are rejected.
    pub min_detune_hz: f64,
    /// RF mode code meaning "chirp".
    pub rf_mode_chirp: u8,
}

impl Default for Import {
    fn default() -> Self {
        Self {
            min_detune_hz: 3_000.0,
            rf_mode_chirp: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Monitor {
    /// Number of recent detune readings kept while a landing runs.
    pub history: usize,
    /// Milliseconds between detune polls while the history fills.
    pub interval_ms: u64,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            history: 8,
            interval_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

// ── Simulator seed ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TuneConfigName {
    #[default]
    Resonance,
    Cold,
    Parked,
    Other,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HwModeName {
    #[default]
    Online,
    Maintenance,
    Offline,
    MaintenanceDone,
    Ready,
}

/// Per-cavity overrides of the `[sim]` defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SimCavity {
    pub cm: String,
    pub cavity: u8,
    pub detune_hz: Option<f64>,
    pub df_cold_hz: Option<f64>,
    pub nsteps_cold: Option<f64>,
    pub nsteps_park: Option<f64>,
    pub step_signed: Option<f64>,
    pub tune_config: Option<TuneConfigName>,
    pub hw_mode: Option<HwModeName>,
}

/// Seeds the simulated transport; every cavity of every cryomodule starts
/// from these values unless a `[[sim.cavity]]` entry overrides it.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Sim {
    pub steps_per_hz: f64,
    pub detune_hz: f64,
    pub df_cold_hz: f64,
    pub nsteps_cold: f64,
    pub nsteps_park: f64,
    pub tune_config: TuneConfigName,
    pub hw_mode: HwModeName,
    #[serde(rename = "cavity")]
    pub cavities: Vec<SimCavity>,
}

impl Default for Sim {
    fn default() -> Self {
        Self {
            steps_per_hz: 1.4,
            detune_hz: 60_000.0,
            df_cold_hz: 0.0,
            nsteps_cold: 0.0,
            nsteps_park: 0.0,
            tune_config: TuneConfigName::Resonance,
            hw_mode: HwModeName::Online,
            cavities: Vec::new(),
        }
    }
}

impl Sim {
    /// Override entry for one cavity, if any.
    pub fn cavity(&self, cm: &str, cavity: u8) -> Option<&SimCavity> {
        self.cavities
            .iter()
            .find(|c| c.cm == cm && c.cavity == cavity)
    }
}

// ── Top level ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub stepper: Stepper,
    pub chirp: Chirp,
    pub autotune: AutoTune,
    pub park: Park,
    pub import: Import,
    pub monitor: Monitor,
    pub logging: Logging,
    pub sim: Sim,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Stepper
        if self.stepper.max_steps == 0 {
            eyre::bail!("stepper.max_steps must be >= 1");
        }
        if self.stepper.speed == 0 {
            eyre::bail!("stepper.speed must be > 0");
        }
        if self.stepper.move_increment == 0 {
            eyre::bail!("stepper.move_increment must be >= 1");
        }
        if self.stepper.poll_ms == 0 {
            eyre::bail!("stepper.poll_ms must be >= 1");
        }
        if self.stepper.motion_timeout_ms < self.stepper.poll_ms {
            eyre::bail!("stepper.motion_timeout_ms must be >= stepper.poll_ms");
        }
        if self.stepper.reset_attempts == 0 {
            eyre::bail!("stepper.reset_attempts must be >= 1");
        }

        // Chirp
        if !positive(self.chirp.guard_band_hz) {
            eyre::bail!("chirp.guard_band_hz must be > 0");
        }
        if !positive(self.chirp.small_default_hz) || !positive(self.chirp.large_default_hz) {
            eyre::bail!("chirp default windows must be > 0");
        }
        if self.chirp.small_default_hz > self.chirp.large_default_hz {
            eyre::bail!("chirp.small_default_hz must be <= chirp.large_default_hz");
        }
        if !positive(self.chirp.small_detune_hz) {
            eyre::bail!("chirp.small_detune_hz must be > 0");
        }

        // AutoTune
        if !positive(self.autotune.tolerance_hz) {
            eyre::bail!("autotune.tolerance_hz must be > 0");
        }
        if !(self.autotune.gain > 0.0 && self.autotune.gain <= 1.0) {
            eyre::bail!("autotune.gain must be in (0.0, 1.0]");
        }
        if self.autotune.max_iterations == 0 {
            eyre::bail!("autotune.max_iterations must be >= 1");
        }
        if !(self.autotune.step_overrun_ratio.is_finite() && self.autotune.step_overrun_ratio >= 1.0)
        {
            eyre::bail!("autotune.step_overrun_ratio must be >= 1.0");
        }
        if !positive(self.autotune.steps_per_hz) {
            eyre::bail!("autotune.steps_per_hz must be > 0");
        }
        if self.autotune.settle_ms > 10 * 60 * 1000 {
            eyre::bail!("autotune.settle_ms is unreasonably large (>10min)");
        }

        // Park / import / monitor
        if !self.park.detune_hz.is_finite() {
            eyre::bail!("park.detune_hz must be finite");
        }
        if !(self.import.min_detune_hz.is_finite() && self.import.min_detune_hz >= 0.0) {
            eyre::bail!("import.min_detune_hz must be >= 0");
        }
        if self.monitor.history == 0 {
            eyre::bail!("monitor.history must be >= 1");
        }
        if self.monitor.interval_ms == 0 || self.monitor.interval_ms > 60_000 {
            eyre::bail!("monitor.interval_ms must be in 1..=60000");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot}");
        }

        // Sim
        if !positive(self.sim.steps_per_hz) {
            eyre::bail!("sim.steps_per_hz must be > 0");
        }
        for c in &self.sim.cavities {
            if !(1..=8).contains(&c.cavity) {
                eyre::bail!("sim.cavity {}:{} out of range 1..=8", c.cm, c.cavity);
            }
        }

        Ok(())
    }
}

// ── Archive CSV ──────────────────────────────────────────────────────────────

/// One archived sample.
///
/// Expected headers:
/// channel,timestamp_s,value
///
/// Example:
/// channel,timestamp_s,value
/// ACCL:L1B:0210:DFBEST,1700000000,-48211.5
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ArchiveRow {
    pub channel: String,
    pub timestamp_s: f64,
    pub value: f64,
}

pub fn load_archive_csv(path: &std::path::Path) -> eyre::Result<Vec<ArchiveRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open archive CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["channel", "timestamp_s", "value"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "archive CSV must have headers 'channel,timestamp_s,value', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ArchiveRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

// ── Report CSV ───────────────────────────────────────────────────────────────

/// One line of the calibration report.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReportRow {
    #[serde(rename = "Cryomodule")]
    pub cryomodule: String,
    #[serde(rename = "Cavity")]
    pub cavity: u8,
    #[serde(rename = "Tune Config")]
    pub tune_config: String,
    /// `None` when the register reading is invalid.
    #[serde(rename = "Steps to Cold Landing")]
    pub steps_to_cold: Option<i64>,
    /// `None` when the register reading is invalid.
    #[serde(rename = "DF Cold")]
    pub df_cold_hz: Option<f64>,
    #[serde(rename = "HW Mode")]
    pub hw_mode: String,
}

pub fn write_report_csv<W: std::io::Write>(out: W, rows: &[ReportRow]) -> eyre::Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| eyre::eyre!("write report row {}:{}: {}", row.cryomodule, row.cavity, e))?;
    }
    wtr.flush()
        .map_err(|e| eyre::eyre!("flush report CSV: {}", e))?;
    Ok(())
}
