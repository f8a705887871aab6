//! One tuner unit: identity, immutable channel table, abort latch and the
//! per-cavity exclusivity flag.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tuner_traits::registers::{self, cavity as cav, codes, ssa, stepper};
use tuner_traits::{ChannelError, HardwareChannel, Reading};

use crate::abort::AbortToken;
use crate::error::{BuildError, Result, TunerError};
use crate::hw_error::map_hw_error;
use crate::linac;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CavityId {
    pub cryomodule: String,
    pub number: u8,
}

impl CavityId {
    pub fn new(cryomodule: impl Into<String>, number: u8) -> Self {
        Self {
            cryomodule: cryomodule.into(),
            number,
        }
    }
}

impl fmt::Display for CavityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CM{} cavity {}", self.cryomodule, self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TuneConfiguration {
    Resonance,
    Cold,
    Parked,
    Other,
}

impl TuneConfiguration {
    pub fn code(self) -> f64 {
        match self {
            Self::Resonance => codes::TUNE_RESONANCE,
            Self::Cold => codes::TUNE_COLD,
            Self::Parked => codes::TUNE_PARKED,
            Self::Other => codes::TUNE_OTHER,
        }
    }

    pub fn from_code(code: f64) -> Option<Self> {
        [Self::Resonance, Self::Cold, Self::Parked, Self::Other]
            .into_iter()
            .find(|c| c.code() == code)
    }
}

impl fmt::Display for TuneConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resonance => "Resonance",
            Self::Cold => "Cold",
            Self::Parked => "Parked",
            Self::Other => "Other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareMode {
    Online,
    Maintenance,
    Offline,
    MaintenanceDone,
    Ready,
}

impl HardwareMode {
    pub fn code(self) -> f64 {
        match self {
            Self::Online => codes::HW_ONLINE,
            Self::Maintenance => codes::HW_MAINTENANCE,
            Self::Offline => codes::HW_OFFLINE,
            Self::MaintenanceDone => codes::HW_MAINTENANCE_DONE,
            Self::Ready => codes::HW_READY,
        }
    }

    pub fn from_code(code: f64) -> Option<Self> {
        [
            Self::Online,
            Self::Maintenance,
            Self::Offline,
            Self::MaintenanceDone,
            Self::Ready,
        ]
        .into_iter()
        .find(|m| m.code() == code)
    }
}

impl fmt::Display for HardwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Online => "Online",
            Self::Maintenance => "Maintenance",
            Self::Offline => "Offline",
            Self::MaintenanceDone => "Maintenance Done",
            Self::Ready => "Ready",
        };
        f.write_str(s)
    }
}

/// Observable stepper phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperPhase {
    Idle,
    Moving,
    Aborted,
}

impl StepperPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Moving,
            2 => Self::Aborted,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Moving => 1,
            Self::Aborted => 2,
        }
    }
}

/// Full channel names for one cavity, resolved once at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CavityChannels {
    pub tune_config: String,
    pub hw_mode: String,
    pub detune: String,
    pub df_cold: String,
    pub park: String,
    pub chirp_start: String,
    pub chirp_stop: String,
    pub rf_ctrl: String,
    pub rf_state: String,
    pub rf_mode_ctrl: String,
    pub rf_mode: String,
    pub ssa_on: String,
    pub ssa_off: String,
    pub ssa_status: String,
    pub nsteps_park: String,
    pub nsteps_cold: String,
    pub step_total: String,
    pub step_signed: String,
    pub reset_signed: String,
    pub abort: String,
    pub nsteps: String,
    pub max_speed: String,
    pub move_pos: String,
    pub move_neg: String,
    pub motion_state: String,
}

impl CavityChannels {
    pub fn new(prefix: &str) -> Self {
        let c = |s: &str| format!("{prefix}{s}");
        let stp = registers::stepper_prefix(prefix);
        let s = |x: &str| format!("{stp}{x}");
        let ssa_p = registers::ssa_prefix(prefix);
        let a = |x: &str| format!("{ssa_p}{x}");
        Self {
            tune_config: c(cav::TUNE_CONFIG),
            hw_mode: c(cav::HW_MODE),
            detune: c(cav::DETUNE_BEST),
            df_cold: c(cav::DF_COLD),
            park: c(cav::PARK),
            chirp_start: c(cav::CHIRP_START),
            chirp_stop: c(cav::CHIRP_STOP),
            rf_ctrl: c(cav::RF_CTRL),
            rf_state: c(cav::RF_STATE),
            rf_mode_ctrl: c(cav::RF_MODE_CTRL),
            rf_mode: c(cav::RF_MODE),
            ssa_on: a(ssa::POWER_ON),
            ssa_off: a(ssa::POWER_OFF),
            ssa_status: a(ssa::STATUS),
            nsteps_park: s(stepper::NSTEPS_PARK),
            nsteps_cold: s(stepper::NSTEPS_COLD),
            step_total: s(stepper::STEP_TOTAL),
            step_signed: s(stepper::STEP_SIGNED),
            reset_signed: s(stepper::RESET_SIGNED),
            abort: s(stepper::ABORT),
            nsteps: s(stepper::NSTEPS),
            max_speed: s(stepper::MAX_SPEED),
            move_pos: s(stepper::MOVE_POS),
            move_neg: s(stepper::MOVE_NEG),
            motion_state: s(stepper::MOTION_STATE),
        }
    }
}

/// A registered cavity.
///
/// Long-lived: owns the abort latch and the stepper phase across
/// operations. Landing state that only matters for one call lives in the
/// `Lander` call frame instead.
pub struct Cavity {
    id: CavityId,
    prefix: String,
    channels: CavityChannels,
    hw: Arc<dyn HardwareChannel>,
    abort: AbortToken,
    busy: AtomicBool,
    phase: AtomicU8,
    steps_per_hz: f64,
}

impl fmt::Debug for Cavity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cavity")
            .field("id", &self.id)
            .field("prefix", &self.prefix)
            .field("abort", &self.abort.is_requested())
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .field("phase", &self.stepper_phase())
            .finish()
    }
}

impl Cavity {
    /// Register a cavity on `hw`. Fails for cryomodules outside the machine.
    pub fn new(id: CavityId, hw: Arc<dyn HardwareChannel>, steps_per_hz: f64) -> Result<Self> {
        let linac = linac::linac_for(&id.cryomodule)
            .ok_or_else(|| eyre::Report::new(BuildError::UnknownCryomodule(id.cryomodule.clone())))?;
        if !(1..=linac::CAVITIES_PER_CM).contains(&id.number) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "cavity number must be in 1..=8",
            )));
        }
        if !(steps_per_hz.is_finite() && steps_per_hz > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "steps_per_hz must be > 0",
            )));
        }
        let prefix = registers::cavity_prefix(linac, &id.cryomodule, id.number);
        let channels = CavityChannels::new(&prefix);
        Ok(Self {
            id,
            prefix,
            channels,
            hw,
            abort: AbortToken::new(),
            busy: AtomicBool::new(false),
            phase: AtomicU8::new(StepperPhase::Idle.as_u8()),
            steps_per_hz,
        })
    }

    pub fn id(&self) -> &CavityId {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn channels(&self) -> &CavityChannels {
        &self.channels
    }

    pub fn steps_per_hz(&self) -> f64 {
        self.steps_per_hz
    }

    pub(crate) fn hw(&self) -> &Arc<dyn HardwareChannel> {
        &self.hw
    }

    // ── Cancellation & exclusivity ───────────────────────────────────────────

    pub fn abort_token(&self) -> &AbortToken {
        &self.abort
    }

    /// Latch the abort flag and ask the stepper to stop.
    ///
    /// The latch is set even when the stop request cannot be delivered.
    pub fn request_abort(&self) -> Result<()> {
        self.abort.request();
        tracing::warn!(cavity = %self.id, "abort requested");
        self.write(&self.channels.abort, 1.0, false)
    }

    /// Acknowledge an abort so the cavity can be used again.
    pub fn clear_abort(&self) {
        self.abort.clear();
        if self.stepper_phase() == StepperPhase::Aborted {
            self.set_stepper_phase(StepperPhase::Idle);
        }
        tracing::info!(cavity = %self.id, "abort cleared");
    }

    /// Claim the cavity for one landing/park operation.
    pub fn begin_operation(&self) -> Result<OperationGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(eyre::Report::new(TunerError::Busy(self.id.clone())));
        }
        Ok(OperationGuard { cavity: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn stepper_phase(&self) -> StepperPhase {
        StepperPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_stepper_phase(&self, phase: StepperPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    // ── Raw channel access ───────────────────────────────────────────────────

    pub fn read(&self, name: &str) -> Result<Reading> {
        self.hw.read(name).map_err(|e| channel_error(name, e))
    }

    pub fn write(&self, name: &str, value: f64, wait: bool) -> Result<()> {
        self.hw
            .write(name, value, wait)
            .map_err(|e| channel_error(name, e))
    }

    /// Read a register that must hold a usable value.
    fn read_valid(&self, name: &str) -> Result<f64> {
        let r = self.read(name)?;
        if !r.is_valid() {
            return Err(eyre::Report::new(TunerError::HardwareFault(format!(
                "{name} reading is invalid"
            ))));
        }
        Ok(r.value)
    }

    // ── Typed registers ──────────────────────────────────────────────────────

    pub fn tune_config(&self) -> Result<TuneConfiguration> {
        let v = self.read_valid(&self.channels.tune_config)?;
        TuneConfiguration::from_code(v).ok_or_else(|| {
            eyre::Report::new(TunerError::State(format!("unknown tune config code {v}")))
        })
    }

    pub fn set_tune_config(&self, config: TuneConfiguration) -> Result<()> {
        tracing::debug!(cavity = %self.id, config = %config, "tune config");
        self.write(&self.channels.tune_config, config.code(), true)
    }

    pub fn hw_mode(&self) -> Result<HardwareMode> {
        let v = self.read_valid(&self.channels.hw_mode)?;
        HardwareMode::from_code(v).ok_or_else(|| {
            eyre::Report::new(TunerError::State(format!("unknown hardware mode code {v}")))
        })
    }

    /// Live detune with its quality attached; invalid readings are returned,
    /// not rejected.
    pub fn detune(&self) -> Result<Reading> {
        self.read(&self.channels.detune)
    }

    pub fn df_cold(&self) -> Result<Reading> {
        self.read(&self.channels.df_cold)
    }

    pub fn set_df_cold(&self, hz: f64) -> Result<()> {
        tracing::info!(cavity = %self.id, detune_hz = hz, "recording cold-landing detune");
        self.write(&self.channels.df_cold, hz, true)
    }

    pub fn nsteps_cold(&self) -> Result<Reading> {
        self.read(&self.channels.nsteps_cold)
    }

    pub fn set_nsteps_cold(&self, steps: i64) -> Result<()> {
        tracing::info!(cavity = %self.id, steps, "recording steps to cold landing");
        self.write(&self.channels.nsteps_cold, steps as f64, true)
    }

    pub fn nsteps_park(&self) -> Result<Reading> {
        self.read(&self.channels.nsteps_park)
    }

    pub fn set_nsteps_park(&self, steps: i64) -> Result<()> {
        tracing::info!(cavity = %self.id, steps, "recording steps to park");
        self.write(&self.channels.nsteps_park, steps as f64, true)
    }

    pub fn step_total(&self) -> Result<i64> {
        Ok(self.read_valid(&self.channels.step_total)?.round() as i64)
    }

    pub fn step_signed(&self) -> Result<i64> {
        Ok(self.read_valid(&self.channels.step_signed)?.round() as i64)
    }

    pub fn mark_parked(&self) -> Result<()> {
        self.write(&self.channels.park, 1.0, true)
    }

    // ── RF / SSA ─────────────────────────────────────────────────────────────

    /// Centre the chirp window on zero with half-width `range_hz`.
    pub fn apply_chirp_range(&self, range_hz: f64) -> Result<()> {
        tracing::debug!(cavity = %self.id, chirp_hz = range_hz, "chirp range");
        self.write(&self.channels.chirp_start, -range_hz, true)?;
        self.write(&self.channels.chirp_stop, range_hz, true)
    }

    pub fn ssa_on(&self) -> Result<()> {
        self.write(&self.channels.ssa_on, 1.0, true)
    }

    pub fn rf_mode_chirp(&self) -> Result<()> {
        self.write(&self.channels.rf_mode_ctrl, codes::RF_MODE_CHIRP, true)
    }

    pub fn rf_on(&self) -> Result<()> {
        self.write(&self.channels.rf_ctrl, codes::RF_ON, true)
    }

    /// RF off, then the amplifier.
    pub fn power_down(&self) -> Result<()> {
        tracing::info!(cavity = %self.id, "powering down RF and SSA");
        self.write(&self.channels.rf_ctrl, codes::RF_OFF, true)?;
        self.write(&self.channels.ssa_off, 1.0, true)
    }
}

fn channel_error(name: &str, e: ChannelError) -> eyre::Report {
    let mapped = map_hw_error(e.as_ref());
    tracing::warn!(channel = name, error = %mapped, "channel access failed");
    eyre::Report::new(mapped)
}

/// Exclusive claim on a cavity; released on drop.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    cavity: &'a Cavity,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.cavity.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_hardware::SimulatedChannels;

    fn cavity() -> Cavity {
        Cavity::new(
            CavityId::new("H1", 4),
            Arc::new(SimulatedChannels::new()),
            1.4,
        )
        .unwrap()
    }

    #[test]
    fn prefix_comes_from_topology() {
        let c = cavity();
        assert_eq!(c.prefix(), "ACCL:L1B:H140:");
        assert_eq!(c.channels().detune, "ACCL:L1B:H140:DFBEST");
        assert_eq!(c.channels().step_signed, "ACCL:L1B:H140:STEP:REG_TOTSGN");
        assert_eq!(c.channels().ssa_off, "ACCL:L1B:H140:SSA:PowerOff");
    }

    #[test]
    fn unknown_cryomodule_is_rejected() {
        let err = Cavity::new(
            CavityId::new("99", 1),
            Arc::new(SimulatedChannels::new()),
            1.4,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::UnknownCryomodule(cm)) if cm == "99"
        ));
    }

    #[test]
    fn second_operation_is_busy_until_guard_drops() {
        let c = cavity();
        let guard = c.begin_operation().unwrap();
        let err = c.begin_operation().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TunerError>(),
            Some(TunerError::Busy(_))
        ));
        drop(guard);
        assert!(c.begin_operation().is_ok());
    }

    #[test]
    fn codes_round_trip_and_reject_unknown() {
        assert_eq!(
            TuneConfiguration::from_code(TuneConfiguration::Parked.code()),
            Some(TuneConfiguration::Parked)
        );
        assert_eq!(TuneConfiguration::from_code(7.0), None);
        assert_eq!(HardwareMode::from_code(4.0), Some(HardwareMode::Ready));
    }
}
