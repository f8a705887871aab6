use std::sync::Arc;
use std::sync::Mutex;

use rstest::rstest;
use tuner_hardware::{HwError, SimulatedChannels, TunerSim, install_cavity, true_detune};
use tuner_traits::HardwareChannel;
use tuner_traits::registers::cavity_prefix;

#[rstest]
#[case(1.4, 14_000.0, 10_000.0)]
#[case(2.0, 4_000.0, 2_000.0)]
#[case(1.0, -3_000.0, -3_000.0)]
fn step_moves_shift_true_detune(#[case] steps_per_hz: f64, #[case] steps: f64, #[case] hz: f64) {
    let cav = cavity_prefix("L1B", "02", 3);
    let sim = SimulatedChannels::new();
    install_cavity(
        &sim,
        &cav,
        TunerSim {
            steps_per_hz,
            detune_hz: 20_000.0,
            ..TunerSim::default()
        },
    );
    let dir = if steps >= 0.0 { "MOV_REQ_POS" } else { "MOV_REQ_NEG" };
    sim.write(&format!("{cav}STEP:NSTEPS"), steps.abs(), true)
        .unwrap();
    sim.write(&format!("{cav}STEP:{dir}"), 1.0, true).unwrap();
    assert!((true_detune(&sim, &cav) - (20_000.0 - hz)).abs() < 1e-6);
}

#[test]
fn cavities_do_not_share_state() {
    let a = cavity_prefix("L2B", "04", 1);
    let b = cavity_prefix("L2B", "04", 2);
    let sim = SimulatedChannels::new();
    install_cavity(&sim, &a, TunerSim::default());
    install_cavity(&sim, &b, TunerSim::default());
    sim.write(&format!("{a}STEP:NSTEPS"), 700.0, true).unwrap();
    sim.write(&format!("{a}STEP:MOV_REQ_POS"), 1.0, true).unwrap();
    assert_eq!(sim.value(&format!("{a}STEP:REG_TOTSGN")), Some(700.0));
    assert_eq!(sim.value(&format!("{b}STEP:REG_TOTSGN")), Some(0.0));
}

#[test]
fn detune_subscription_sees_moves() {
    let cav = cavity_prefix("L0B", "01", 1);
    let sim = SimulatedChannels::new();
    install_cavity(
        &sim,
        &cav,
        TunerSim {
            detune_hz: 1_000.0,
            steps_per_hz: 1.0,
            ..TunerSim::default()
        },
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = sim
        .subscribe(
            &format!("{cav}DFBEST"),
            Box::new(move |_, r| sink.lock().unwrap().push(r.value)),
        )
        .unwrap();
    sim.write(&format!("{cav}STEP:NSTEPS"), 400.0, true).unwrap();
    sim.write(&format!("{cav}STEP:MOV_REQ_POS"), 1.0, true).unwrap();
    sim.unsubscribe(id).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![600.0]);
}

#[test]
fn disconnected_register_rejects_puts_with_typed_error() {
    let cav = cavity_prefix("L0B", "01", 1);
    let sim = SimulatedChannels::new();
    install_cavity(&sim, &cav, TunerSim::default());
    sim.disconnect(&format!("{cav}STEP:NSTEPS"));
    let err = sim
        .write(&format!("{cav}STEP:NSTEPS"), 1.0, true)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::Disconnected(_))
    ));
}
