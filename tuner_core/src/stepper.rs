//! Bounded, abortable stepper motion and step-count bookkeeping.

use std::time::Duration;

use tuner_traits::Clock;
use tuner_traits::registers::codes;

use crate::cavity::{Cavity, StepperPhase};
use crate::config::StepperCfg;
use crate::error::{Result, TunerError};
use crate::util::poll_until;

/// What `move_to_recorded_position` actually commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovePlan {
    pub recorded_steps: i64,
    pub signed_at_start: i64,
    pub target_steps: i64,
}

impl MovePlan {
    /// `recorded - signed` when the current position counts, else `recorded`.
    pub fn new(recorded_steps: i64, signed_at_start: i64, count_current: bool) -> Self {
        let target_steps = if count_current {
            recorded_steps.saturating_sub(signed_at_start)
        } else {
            recorded_steps
        };
        Self {
            recorded_steps,
            signed_at_start,
            target_steps,
        }
    }
}

pub struct StepperController<'a> {
    cavity: &'a Cavity,
    cfg: &'a StepperCfg,
    clock: &'a dyn Clock,
}

impl<'a> StepperController<'a> {
    pub fn new(cavity: &'a Cavity, cfg: &'a StepperCfg, clock: &'a dyn Clock) -> Self {
        Self { cavity, cfg, clock }
    }

    pub fn phase(&self) -> StepperPhase {
        self.cavity.stepper_phase()
    }

    /// Move `delta` steps (positive lowers the frequency) in increments of
    /// at most `move_increment`, checking the abort latch between them.
    pub fn move_steps(&self, delta: i64, max_steps: u64, speed: u32) -> Result<()> {
        if delta.unsigned_abs() > max_steps {
            return Err(eyre::Report::new(TunerError::OutOfRange {
                requested: delta,
                max: max_steps,
            }));
        }
        self.cavity.abort_token().check()?;
        if delta == 0 {
            return Ok(());
        }

        let ch = self.cavity.channels();
        tracing::info!(cavity = %self.cavity.id(), steps = delta, speed, "moving stepper");
        self.cavity.write(&ch.max_speed, f64::from(speed), true)?;

        self.cavity.set_stepper_phase(StepperPhase::Moving);
        let res = self.run_increments(delta);
        match &res {
            Err(e) if matches!(e.downcast_ref::<TunerError>(), Some(TunerError::Aborted)) => {
                self.halt();
            }
            _ => self.cavity.set_stepper_phase(StepperPhase::Idle),
        }
        res
    }

    fn run_increments(&self, delta: i64) -> Result<()> {
        let ch = self.cavity.channels();
        let request = if delta > 0 { &ch.move_pos } else { &ch.move_neg };
        let increment = self.cfg.move_increment.max(1);
        let mut remaining = delta.unsigned_abs();
        while remaining > 0 {
            self.cavity.abort_token().check()?;
            let chunk = remaining.min(increment);
            self.cavity.write(&ch.nsteps, chunk as f64, true)?;
            self.cavity.write(request, 1.0, true)?;
            self.wait_idle()?;
            remaining -= chunk;
            tracing::trace!(cavity = %self.cavity.id(), chunk, remaining, "increment done");
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let ch = self.cavity.channels();
        poll_until(
            self.clock,
            Duration::from_millis(self.cfg.motion_timeout_ms),
            Duration::from_millis(self.cfg.poll_ms),
            self.cavity.abort_token(),
            || {
                let r = self.cavity.read(&ch.motion_state)?;
                Ok(r.is_valid() && r.value == codes::MOTION_IDLE)
            },
        )
    }

    /// Stop motion after an observed abort. Best-effort: the abort is
    /// already being reported.
    fn halt(&self) {
        self.cavity.set_stepper_phase(StepperPhase::Aborted);
        if let Err(e) = self.cavity.write(&self.cavity.channels().abort, 1.0, false) {
            tracing::error!(cavity = %self.cavity.id(), error = %e, "failed to stop stepper");
        }
        tracing::warn!(cavity = %self.cavity.id(), "stepper motion aborted");
    }

    /// Reset the signed step count and confirm it reads zero.
    ///
    /// Discards position bookkeeping, so it is logged at `warn`.
    pub fn reset_signed_count(&self) -> Result<()> {
        let ch = self.cavity.channels();
        let attempts = self.cfg.reset_attempts.max(1);
        tracing::warn!(cavity = %self.cavity.id(), "resetting signed step count");
        for attempt in 1..=attempts {
            self.cavity.abort_token().check()?;
            self.cavity.write(&ch.reset_signed, 1.0, true)?;
            let r = self.cavity.read(&ch.step_signed)?;
            if r.is_valid() && r.value == 0.0 {
                tracing::debug!(cavity = %self.cavity.id(), attempt, "signed count confirmed zero");
                return Ok(());
            }
            tracing::debug!(cavity = %self.cavity.id(), attempt, signed = r.value, "reset not yet visible");
            if attempt < attempts {
                self.clock.sleep(Duration::from_millis(self.cfg.poll_ms));
            }
        }
        Err(eyre::Report::new(TunerError::ResetNotConfirmed { attempts }))
    }

    /// Move to a recorded step position, optionally crediting the signed
    /// steps already travelled.
    pub fn move_to_recorded_position(
        &self,
        recorded_steps: i64,
        count_current: bool,
    ) -> Result<MovePlan> {
        let signed = self.cavity.step_signed()?;
        let plan = MovePlan::new(recorded_steps, signed, count_current);
        tracing::info!(
            cavity = %self.cavity.id(),
            recorded = plan.recorded_steps,
            signed = plan.signed_at_start,
            target = plan.target_steps,
            "moving to recorded position"
        );
        self.move_steps(plan.target_steps, self.cfg.max_steps, self.cfg.speed)?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_credits_signed_steps_only_when_counting() {
        assert_eq!(MovePlan::new(120_000, 20_000, true).target_steps, 100_000);
        assert_eq!(MovePlan::new(120_000, -5_000, true).target_steps, 125_000);
        assert_eq!(MovePlan::new(120_000, 20_000, false).target_steps, 120_000);
    }
}
