#![allow(dead_code)]

use std::sync::Arc;

use crossbeam_channel as xch;
use tuner_core::{AutoTuneCfg, Cavity, CavityId, Lander, StatusUpdate, StepperCfg};
use tuner_hardware::{SimulatedChannels, TunerSim, install_cavity};
use tuner_traits::clock::test_clock::TestClock;

pub use tuner_traits::registers::codes;

/// One simulated cavity on its own transport.
pub struct Rig {
    pub sim: Arc<SimulatedChannels>,
    pub cavity: Cavity,
    pub clock: TestClock,
}

impl Rig {
    pub fn new(seed: TunerSim) -> Self {
        Self::at("02", 1, seed)
    }

    pub fn at(cm: &str, n: u8, seed: TunerSim) -> Self {
        let sim = Arc::new(SimulatedChannels::new());
        let cavity = Cavity::new(CavityId::new(cm, n), sim.clone(), seed.steps_per_hz)
            .expect("register cavity");
        install_cavity(&sim, cavity.prefix(), seed);
        Self {
            sim,
            cavity,
            clock: TestClock::new(),
        }
    }

    /// Current value of a register, by full name.
    pub fn value(&self, name: &str) -> f64 {
        self.sim.value(name).expect("register exists")
    }

    pub fn writes_to(&self, name: &str) -> Vec<f64> {
        self.sim.writes_to(name)
    }

    pub fn lander(&self) -> Lander {
        lander_with(&self.clock, None)
    }

    pub fn lander_with_status(&self) -> (Lander, xch::Receiver<StatusUpdate>) {
        let (tx, rx) = xch::unbounded();
        (lander_with(&self.clock, Some(tx)), rx)
    }

    pub fn stepper_cfg() -> StepperCfg {
        StepperCfg {
            poll_ms: 10,
            motion_timeout_ms: 1_000,
            ..StepperCfg::default()
        }
    }
}

pub fn lander_with(clock: &TestClock, status: Option<xch::Sender<StatusUpdate>>) -> Lander {
    let mut b = Lander::builder()
        .with_stepper(Rig::stepper_cfg())
        .with_autotune(AutoTuneCfg {
            settle_ms: 100,
            ..AutoTuneCfg::default()
        })
        .with_clock(Arc::new(clock.clone()));
    if let Some(tx) = status {
        b = b.with_status(tx);
    }
    b.build().expect("build lander")
}

pub fn tuner_err(e: &eyre::Report) -> &tuner_core::TunerError {
    e.downcast_ref::<tuner_core::TunerError>()
        .unwrap_or_else(|| panic!("not a TunerError: {e:?}"))
}
