//! Simulated cavity + stepper tuner.
//!
//! The model keeps the true detune in a hidden register and publishes it on
//! `DFBEST` only while the measurement is possible: RF on, chirp mode, and
//! the true value inside the configured chirp window. Otherwise `DFBEST`
//! keeps its last value with `Invalid` severity.

use std::sync::Arc;

use tuner_traits::Reading;
use tuner_traits::registers::{cavity, codes, ssa, ssa_prefix, stepper, stepper_prefix};

use crate::sim::{Registers, SimulatedChannels, WriteHook};

/// Hidden register holding the physical detune.
pub const TRUE_DETUNE: &str = "SIM:DF_TRUE";

/// Initial register contents and fault injection for one simulated cavity.
#[derive(Debug, Clone)]
pub struct TunerSim {
    pub steps_per_hz: f64,
    pub detune_hz: f64,
    pub tune_config: f64,
    pub hw_mode: f64,
    pub df_cold_hz: f64,
    pub nsteps_cold: f64,
    pub nsteps_park: f64,
    pub step_total: f64,
    pub step_signed: f64,
    /// Signed-count reset requests are ignored (non-responsive device).
    pub reset_ignored: bool,
    /// Motion requests never complete (`STAT_MOV` stays busy).
    pub motion_stalls: bool,
    /// Fraction of commanded steps that actually move the tuner.
    pub step_efficiency: f64,
}

impl Default for TunerSim {
    fn default() -> Self {
        Self {
            steps_per_hz: 1.4,
            detune_hz: 0.0,
            tune_config: codes::TUNE_RESONANCE,
            hw_mode: codes::HW_ONLINE,
            df_cold_hz: 0.0,
            nsteps_cold: 0.0,
            nsteps_park: 0.0,
            step_total: 0.0,
            step_signed: 0.0,
            reset_ignored: false,
            motion_stalls: false,
            step_efficiency: 1.0,
        }
    }
}

struct TunerModel {
    cav: String,
    stp: String,
    ssa: String,
    cfg: TunerSim,
}

impl TunerModel {
    fn n(&self, prefix: &str, suffix: &str) -> String {
        format!("{prefix}{suffix}")
    }

    fn publish_detune(&self, regs: &mut Registers) {
        let truth = regs.value(&self.n(&self.cav, TRUE_DETUNE));
        let rf_on = regs.value(&self.n(&self.cav, cavity::RF_STATE)) == codes::RF_ON;
        let chirp = regs.value(&self.n(&self.cav, cavity::RF_MODE)) == codes::RF_MODE_CHIRP;
        let lo = regs.value(&self.n(&self.cav, cavity::CHIRP_START));
        let hi = regs.value(&self.n(&self.cav, cavity::CHIRP_STOP));
        let name = self.n(&self.cav, cavity::DETUNE_BEST);
        if rf_on && chirp && truth >= lo && truth <= hi {
            regs.set(&name, Reading::ok(truth));
        } else {
            let last = regs.value(&name);
            regs.set(&name, Reading::invalid(last));
        }
    }

    fn do_move(&self, regs: &mut Registers, sign: f64) {
        if self.cfg.motion_stalls {
            regs.set_value(
                &self.n(&self.stp, stepper::MOTION_STATE),
                codes::MOTION_MOVING,
            );
            return;
        }
        let steps = regs.value(&self.n(&self.stp, stepper::NSTEPS)).abs();
        let signed = self.n(&self.stp, stepper::STEP_SIGNED);
        let total = self.n(&self.stp, stepper::STEP_TOTAL);
        regs.set_value(&signed, regs.value(&signed) + sign * steps);
        regs.set_value(&total, regs.value(&total) + steps);
        // Positive steps lower the resonance frequency.
        let truth = self.n(&self.cav, TRUE_DETUNE);
        let moved_hz = sign * steps * self.cfg.step_efficiency / self.cfg.steps_per_hz;
        regs.set_value(&truth, regs.value(&truth) - moved_hz);
        regs.set_value(
            &self.n(&self.stp, stepper::MOTION_STATE),
            codes::MOTION_IDLE,
        );
        self.publish_detune(regs);
    }
}

impl WriteHook for TunerModel {
    fn on_write(&self, regs: &mut Registers, name: &str, value: f64) {
        if let Some(suffix) = name.strip_prefix(self.stp.as_str()) {
            match suffix {
                stepper::MOVE_POS if value != 0.0 => self.do_move(regs, 1.0),
                stepper::MOVE_NEG if value != 0.0 => self.do_move(regs, -1.0),
                stepper::RESET_SIGNED if value != 0.0 && !self.cfg.reset_ignored => {
                    regs.set_value(&self.n(&self.stp, stepper::STEP_SIGNED), 0.0);
                }
                stepper::ABORT if value != 0.0 => {
                    regs.set_value(
                        &self.n(&self.stp, stepper::MOTION_STATE),
                        codes::MOTION_IDLE,
                    );
                }
                _ => {}
            }
            return;
        }
        if let Some(suffix) = name.strip_prefix(self.ssa.as_str()) {
            let status = self.n(&self.ssa, ssa::STATUS);
            match suffix {
                ssa::POWER_ON if value != 0.0 => regs.set_value(&status, codes::SSA_ON),
                ssa::POWER_OFF if value != 0.0 => regs.set_value(&status, codes::SSA_OFF),
                _ => {}
            }
            return;
        }
        if let Some(suffix) = name.strip_prefix(self.cav.as_str()) {
            match suffix {
                cavity::RF_CTRL => {
                    regs.set_value(&self.n(&self.cav, cavity::RF_STATE), value);
                    self.publish_detune(regs);
                }
                cavity::RF_MODE_CTRL => {
                    regs.set_value(&self.n(&self.cav, cavity::RF_MODE), value);
                    self.publish_detune(regs);
                }
                cavity::CHIRP_START | cavity::CHIRP_STOP => self.publish_detune(regs),
                _ => {}
            }
        }
    }
}

/// Declare every register of one cavity and attach its device model.
pub fn install_cavity(sim: &SimulatedChannels, cavity_prefix: &str, cfg: TunerSim) {
    let stp = stepper_prefix(cavity_prefix);
    let ssa_p = ssa_prefix(cavity_prefix);
    let c = |s: &str| format!("{cavity_prefix}{s}");
    let s = |x: &str| format!("{stp}{x}");

    sim.insert(&c(cavity::TUNE_CONFIG), cfg.tune_config);
    sim.insert(&c(cavity::HW_MODE), cfg.hw_mode);
    sim.insert(&c(cavity::DETUNE_BEST), cfg.detune_hz);
    sim.insert(&c(cavity::DF_COLD), cfg.df_cold_hz);
    sim.insert(&c(cavity::PARK), 0.0);
    sim.insert(&c(cavity::CHIRP_START), -200_000.0);
    sim.insert(&c(cavity::CHIRP_STOP), 200_000.0);
    sim.insert(&c(cavity::RF_CTRL), codes::RF_ON);
    sim.insert(&c(cavity::RF_STATE), codes::RF_ON);
    sim.insert(&c(cavity::RF_MODE_CTRL), codes::RF_MODE_CHIRP);
    sim.insert(&c(cavity::RF_MODE), codes::RF_MODE_CHIRP);
    sim.insert(&c(TRUE_DETUNE), cfg.detune_hz);

    sim.insert(&s(stepper::NSTEPS_PARK), cfg.nsteps_park);
    sim.insert(&s(stepper::NSTEPS_COLD), cfg.nsteps_cold);
    sim.insert(&s(stepper::STEP_TOTAL), cfg.step_total);
    sim.insert(&s(stepper::STEP_SIGNED), cfg.step_signed);
    sim.insert(&s(stepper::RESET_SIGNED), 0.0);
    sim.insert(&s(stepper::ABORT), 0.0);
    sim.insert(&s(stepper::NSTEPS), 0.0);
    sim.insert(&s(stepper::MAX_SPEED), 0.0);
    sim.insert(&s(stepper::MOVE_POS), 0.0);
    sim.insert(&s(stepper::MOVE_NEG), 0.0);
    sim.insert(&s(stepper::MOTION_STATE), codes::MOTION_IDLE);

    sim.insert(&format!("{ssa_p}{}", ssa::POWER_ON), 0.0);
    sim.insert(&format!("{ssa_p}{}", ssa::POWER_OFF), 0.0);
    sim.insert(&format!("{ssa_p}{}", ssa::STATUS), codes::SSA_ON);

    sim.add_hook(
        cavity_prefix,
        Arc::new(TunerModel {
            cav: cavity_prefix.to_string(),
            stp,
            ssa: ssa_p,
            cfg,
        }),
    );
    tracing::debug!(cavity = cavity_prefix, "simulated tuner installed");
}

/// The physical detune of a simulated cavity, regardless of measurability.
pub fn true_detune(sim: &SimulatedChannels, cavity_prefix: &str) -> f64 {
    sim.value(&format!("{cavity_prefix}{TRUE_DETUNE}"))
        .unwrap_or(0.0)
}
