//! Cold-landing and park procedures.
//!
//! Both follow the same shape: short-circuit when already landed, snapshot
//! the starting configuration, pick a [`Strategy`] once, set up the chirp
//! measurement, mark the cavity `Other`, optionally reset the signed step
//! count, tune, persist what was learned and power down.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as xch;
use tuner_traits::{Clock, MonotonicClock, Reading};

use crate::autotune::AutoTuneLoop;
use crate::cavity::{Cavity, CavityId, HardwareMode, TuneConfiguration};
use crate::chirp::ChirpRangeSelector;
use crate::config::{AutoTuneCfg, ChirpCfg, LandingCfg, StepperCfg};
use crate::error::{BuildError, Result, TunerError};
use crate::monitor::DetuneMonitor;
use crate::status::{LandingStatus, StatusUpdate};
use crate::stepper::StepperController;

/// How the tuner reaches its target, chosen once per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    /// Closed-loop on measured detune.
    Frequency { target_hz: f64 },
    /// Open-loop move to a recorded step position.
    Steps { recorded_steps: i64 },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Frequency { .. } => "frequency",
            Self::Steps { .. } => "step",
        }
    }

    /// Hardware modes in which this strategy may run.
    pub fn allowed_in(&self, mode: HardwareMode) -> bool {
        match self {
            Self::Frequency { .. } => {
                matches!(mode, HardwareMode::Online | HardwareMode::Maintenance)
            }
            Self::Steps { .. } => matches!(
                mode,
                HardwareMode::Online | HardwareMode::Maintenance | HardwareMode::Ready
            ),
        }
    }
}

/// Calibration written back by a successful call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recorded {
    Nothing,
    StepsToCold(i64),
    StepsToPark(i64),
    ColdDetune(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandingOutcome {
    pub cavity: CavityId,
    /// `None` when the cavity was already landed.
    pub strategy: Option<Strategy>,
    pub final_config: TuneConfiguration,
    pub recorded: Recorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Goal {
    Cold,
    Park,
}

impl Goal {
    fn config(self) -> TuneConfiguration {
        match self {
            Self::Cold => TuneConfiguration::Cold,
            Self::Park => TuneConfiguration::Parked,
        }
    }

    fn started(self) -> &'static str {
        match self {
            Self::Cold => "Moving to cold landing",
            Self::Park => "Parking",
        }
    }

    fn finished(self) -> &'static str {
        match self {
            Self::Cold => "Cavity at cold landing",
            Self::Park => "Cavity parked",
        }
    }
}

/// Runs landing procedures. Shareable across threads; every call keeps its
/// transient state on its own stack.
pub struct Lander {
    stepper: StepperCfg,
    chirp: ChirpRangeSelector,
    autotune: AutoTuneCfg,
    landing: LandingCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    status: Option<xch::Sender<StatusUpdate>>,
}

impl core::fmt::Debug for Lander {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Lander")
            .field("stepper", &self.stepper)
            .field("chirp", &self.chirp)
            .field("autotune", &self.autotune)
            .field("landing", &self.landing)
            .field("status", &self.status.is_some())
            .finish()
    }
}

impl Lander {
    pub fn builder() -> LanderBuilder {
        LanderBuilder::default()
    }

    pub fn move_to_cold_landing(&self, cavity: &Cavity, count_current: bool) -> Result<LandingOutcome> {
        self.run(cavity, Goal::Cold, count_current)
    }

    pub fn park(&self, cavity: &Cavity, count_current: bool) -> Result<LandingOutcome> {
        self.run(cavity, Goal::Park, count_current)
    }

    fn emit(&self, cavity: &Cavity, status: LandingStatus) {
        if let Some(tx) = &self.status {
            // A gone receiver only means nobody is watching.
            let _ = tx.send(StatusUpdate {
                cavity: cavity.id().clone(),
                status,
            });
        }
    }

    fn progress(&self, cavity: &Cavity, msg: impl Into<String>) {
        self.emit(cavity, LandingStatus::Progress(msg.into()));
    }

    fn run(&self, cavity: &Cavity, goal: Goal, count_current: bool) -> Result<LandingOutcome> {
        let res = cavity.begin_operation().and_then(|_guard| {
            self.emit(cavity, LandingStatus::Started(goal.started().to_string()));
            self.land(cavity, goal, count_current)
        });
        match &res {
            Ok(out) => {
                tracing::info!(cavity = %cavity.id(), config = %out.final_config, recorded = ?out.recorded, "landing finished");
                self.emit(cavity, LandingStatus::Finished(goal.finished().to_string()));
            }
            Err(e) => {
                tracing::error!(cavity = %cavity.id(), error = %e, "landing failed");
                self.emit(cavity, LandingStatus::Failed(e.to_string()));
            }
        }
        res
    }

    fn land(&self, cavity: &Cavity, goal: Goal, count_current: bool) -> Result<LandingOutcome> {
        let id = cavity.id().clone();
        let start = cavity.tune_config()?;
        if start == goal.config() {
            tracing::info!(cavity = %id, config = %start, "already landed");
            self.progress(cavity, "Already landed, powering down");
            cavity.power_down()?;
            return Ok(LandingOutcome {
                cavity: id,
                strategy: None,
                final_config: start,
                recorded: Recorded::Nothing,
            });
        }
        cavity.abort_token().check()?;

        let strategy = self.choose_strategy(cavity, goal, start, count_current)?;
        tracing::info!(cavity = %id, start = %start, strategy = ?strategy, count_current, "landing strategy");

        let clock: &dyn Clock = self.clock.as_ref();
        let stepper = StepperController::new(cavity, &self.stepper, clock);

        // Held for the whole call; unsubscribes when it goes out of scope.
        let monitor = DetuneMonitor::start(cavity, self.landing.monitor_history)?;
        monitor.fill(
            cavity,
            clock,
            Duration::from_millis(self.landing.monitor_interval_ms),
        )?;
        let chirp = self.chirp.select(None, monitor.stable_reading());
        self.progress(cavity, "Setting up tuning");
        cavity.ssa_on()?;
        cavity.rf_mode_chirp()?;
        cavity.apply_chirp_range(chirp)?;
        cavity.rf_on()?;
        cavity.set_tune_config(TuneConfiguration::Other)?;

        if !count_current {
            self.progress(cavity, "Resetting signed step count");
            stepper.reset_signed_count()?;
        }
        cavity.abort_token().check()?;

        let recorded = match strategy {
            Strategy::Frequency { target_hz } => {
                let chirp = self.chirp.select(Some(target_hz), None);
                self.progress(cavity, format!("Tuning to {target_hz:.0} Hz"));
                AutoTuneLoop::new(cavity, &self.stepper, &self.autotune, clock).run(
                    target_hz,
                    self.autotune.tolerance_hz,
                    chirp,
                )?;
                cavity.set_tune_config(goal.config())?;
                if goal == Goal::Park {
                    cavity.mark_parked()?;
                }
                if start == TuneConfiguration::Resonance {
                    let total = cavity.step_total()?;
                    match goal {
                        Goal::Cold => {
                            cavity.set_nsteps_cold(total)?;
                            Recorded::StepsToCold(total)
                        }
                        Goal::Park => {
                            cavity.set_nsteps_park(total)?;
                            Recorded::StepsToPark(total)
                        }
                    }
                } else {
                    Recorded::Nothing
                }
            }
            Strategy::Steps { recorded_steps } => {
                let estimate = ChirpRangeSelector::from_steps(recorded_steps, cavity.steps_per_hz());
                cavity.apply_chirp_range(self.chirp.select(Some(estimate), None))?;
                self.progress(cavity, format!("Moving {recorded_steps} steps"));
                stepper.move_to_recorded_position(recorded_steps, count_current)?;
                let detune = cavity.detune()?;
                tracing::debug!(cavity = %id, history = ?monitor.history(), "detune after step move");
                if !detune.is_valid() {
                    return Err(eyre::Report::new(TunerError::Detune(format!(
                        "{id} detune readback invalid after step move"
                    ))));
                }
                cavity.set_df_cold(detune.value)?;
                cavity.set_tune_config(goal.config())?;
                Recorded::ColdDetune(detune.value)
            }
        };

        self.progress(cavity, "Powering down");
        cavity.power_down()?;
        Ok(LandingOutcome {
            cavity: id,
            strategy: Some(strategy),
            final_config: goal.config(),
            recorded,
        })
    }

    /// Pick and gate the strategy before any hardware side effect.
    fn choose_strategy(
        &self,
        cavity: &Cavity,
        goal: Goal,
        start: TuneConfiguration,
        count_current: bool,
    ) -> Result<Strategy> {
        let strategy = match goal {
            Goal::Park => Strategy::Frequency {
                target_hz: self.landing.park_detune_hz,
            },
            Goal::Cold => {
                let df_cold = calibration(cavity, "cold-landing detune", cavity.df_cold()?)?;
                match df_cold {
                    Some(target_hz) => Strategy::Frequency { target_hz },
                    None => {
                        let steps =
                            calibration(cavity, "cold-landing step count", cavity.nsteps_cold()?)?;
                        match steps {
                            Some(steps) => Strategy::Steps {
                                recorded_steps: steps.round() as i64,
                            },
                            None => {
                                return Err(eyre::Report::new(TunerError::State(format!(
                                    "{} has no recorded cold-landing detune or step count",
                                    cavity.id()
                                ))));
                            }
                        }
                    }
                }
            }
        };

        let mode = cavity.hw_mode()?;
        if !strategy.allowed_in(mode) {
            return Err(eyre::Report::new(TunerError::HardwareMode {
                mode,
                strategy: strategy.name(),
            }));
        }
        if matches!(strategy, Strategy::Steps { .. })
            && !count_current
            && start != TuneConfiguration::Resonance
        {
            return Err(eyre::Report::new(TunerError::ResonanceRequired { found: start }));
        }
        Ok(strategy)
    }
}

/// A recorded calibration value: `None` when nothing was recorded (a valid
/// zero), a fault when the register cannot be trusted.
fn calibration(cavity: &Cavity, what: &str, r: Reading) -> Result<Option<f64>> {
    if !r.is_valid() {
        return Err(eyre::Report::new(TunerError::HardwareFault(format!(
            "{} {what} reading is invalid",
            cavity.id()
        ))));
    }
    Ok(r.present())
}

/// Builder for [`Lander`]. All fields are validated on `build()`.
#[derive(Default)]
pub struct LanderBuilder {
    stepper: Option<StepperCfg>,
    chirp: Option<ChirpCfg>,
    autotune: Option<AutoTuneCfg>,
    landing: Option<LandingCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    status: Option<xch::Sender<StatusUpdate>>,
}

impl LanderBuilder {
    pub fn with_stepper(mut self, c: StepperCfg) -> Self {
        self.stepper = Some(c);
        self
    }

    pub fn with_chirp(mut self, c: ChirpCfg) -> Self {
        self.chirp = Some(c);
        self
    }

    pub fn with_autotune(mut self, c: AutoTuneCfg) -> Self {
        self.autotune = Some(c);
        self
    }

    pub fn with_landing(mut self, c: LandingCfg) -> Self {
        self.landing = Some(c);
        self
    }

    /// Inject a clock (tests use `TestClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_status(mut self, tx: xch::Sender<StatusUpdate>) -> Self {
        self.status = Some(tx);
        self
    }

    /// Take every section from a loaded TOML config.
    pub fn apply_config(self, cfg: &tuner_config::Config) -> Self {
        self.with_stepper((&cfg.stepper).into())
            .with_chirp((&cfg.chirp).into())
            .with_autotune((&cfg.autotune).into())
            .with_landing(cfg.into())
    }

    pub fn build(self) -> Result<Lander> {
        let stepper = self.stepper.unwrap_or_default();
        let chirp = self.chirp.unwrap_or_default();
        let autotune = self.autotune.unwrap_or_default();
        let landing = self.landing.unwrap_or_default();

        let invalid = |msg: &'static str| Err(eyre::Report::new(BuildError::InvalidConfig(msg)));
        if stepper.max_steps == 0 || stepper.move_increment == 0 || stepper.speed == 0 {
            return invalid("stepper limits must be > 0");
        }
        if stepper.poll_ms == 0 || stepper.reset_attempts == 0 {
            return invalid("stepper polling must be >= 1");
        }
        if !(chirp.guard_band_hz > 0.0) || chirp.small_default_hz > chirp.large_default_hz {
            return invalid("chirp windows are inconsistent");
        }
        if !(autotune.tolerance_hz > 0.0) {
            return invalid("tolerance_hz must be > 0");
        }
        if !(autotune.gain > 0.0 && autotune.gain <= 1.0) {
            return invalid("gain must be in (0.0, 1.0]");
        }
        if autotune.max_iterations == 0 || !(autotune.step_overrun_ratio >= 1.0) {
            return invalid("auto-tune guards are inconsistent");
        }
        if !landing.park_detune_hz.is_finite()
            || landing.monitor_history == 0
            || landing.monitor_interval_ms == 0
        {
            return invalid("landing parameters are inconsistent");
        }

        Ok(Lander {
            stepper,
            chirp: ChirpRangeSelector::new(chirp),
            autotune,
            landing,
            clock: match self.clock {
                Some(c) => c,
                None => Arc::new(MonotonicClock::new()),
            },
            status: self.status,
        })
    }
}
