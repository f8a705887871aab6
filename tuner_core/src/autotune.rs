//! Closed-loop convergence of the live detune toward a target.

use std::time::Duration;

use tuner_traits::Clock;

use crate::cavity::Cavity;
use crate::config::{AutoTuneCfg, StepperCfg};
use crate::error::{Result, TunerError};
use crate::stepper::StepperController;
use crate::util::pause;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneOutcome {
    pub final_detune_hz: f64,
    pub steps_moved: u64,
    pub iterations: u32,
}

pub struct AutoTuneLoop<'a> {
    cavity: &'a Cavity,
    stepper: StepperController<'a>,
    stepper_cfg: &'a StepperCfg,
    cfg: &'a AutoTuneCfg,
    clock: &'a dyn Clock,
}

impl<'a> AutoTuneLoop<'a> {
    pub fn new(
        cavity: &'a Cavity,
        stepper_cfg: &'a StepperCfg,
        cfg: &'a AutoTuneCfg,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            cavity,
            stepper: StepperController::new(cavity, stepper_cfg, clock),
            stepper_cfg,
            cfg,
            clock,
        }
    }

    /// Tune until `|detune - target| <= tolerance`.
    ///
    /// Applies `chirp_range_hz` first. Fails with `TunerError::Detune` on an
    /// invalid readback, on exceeding `max_iterations`, or once cumulative
    /// steps pass `step_overrun_ratio` times the initial estimate.
    pub fn run(&self, target_hz: f64, tolerance_hz: f64, chirp_range_hz: f64) -> Result<TuneOutcome> {
        let id = self.cavity.id();
        let steps_per_hz = self.cavity.steps_per_hz();
        self.cavity.apply_chirp_range(chirp_range_hz)?;

        let mut detune = self.read_detune()?;
        let mut delta = detune - target_hz;
        let expected = (delta * steps_per_hz).abs();
        let budget = self.cfg.step_overrun_ratio * expected;
        let mut moved: u64 = 0;
        let mut iterations: u32 = 0;
        tracing::info!(
            cavity = %id,
            detune_hz = detune,
            target_hz,
            chirp_hz = chirp_range_hz,
            expected_steps = expected,
            "auto-tune start"
        );

        while delta.abs() > tolerance_hz {
            self.cavity.abort_token().check()?;
            if iterations >= self.cfg.max_iterations {
                return Err(eyre::Report::new(TunerError::Detune(format!(
                    "{id} did not converge within {iterations} iterations (detune {detune:.0} Hz, target {target_hz:.0} Hz)"
                ))));
            }
            let mut est = (self.cfg.gain * delta * steps_per_hz).round() as i64;
            if est == 0 {
                est = if delta > 0.0 { 1 } else { -1 };
            }
            self.stepper
                .move_steps(est, self.stepper_cfg.max_steps, self.stepper_cfg.speed)?;
            moved = moved.saturating_add(est.unsigned_abs());
            iterations += 1;
            if moved as f64 > budget {
                return Err(eyre::Report::new(TunerError::Detune(format!(
                    "{id} moved {moved} steps, over the {budget:.0} step budget"
                ))));
            }
            pause(
                self.clock,
                Duration::from_millis(self.cfg.settle_ms),
                Duration::from_millis(self.stepper_cfg.poll_ms),
                self.cavity.abort_token(),
            )?;
            detune = self.read_detune()?;
            delta = detune - target_hz;
            tracing::debug!(cavity = %id, iteration = iterations, detune_hz = detune, moved, "auto-tune step");
        }

        tracing::info!(cavity = %id, detune_hz = detune, steps = moved, iterations, "auto-tune converged");
        Ok(TuneOutcome {
            final_detune_hz: detune,
            steps_moved: moved,
            iterations,
        })
    }

    fn read_detune(&self) -> Result<f64> {
        let r = self.cavity.detune()?;
        if !r.is_valid() {
            return Err(eyre::Report::new(TunerError::Detune(format!(
                "{} detune readback invalid",
                self.cavity.id()
            ))));
        }
        Ok(r.value)
    }
}
