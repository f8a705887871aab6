mod common;

use std::time::Duration;

use common::{Rig, codes, tuner_err};
use rstest::rstest;
use tuner_core::{StepperCfg, StepperController, StepperPhase, TunerError};
use tuner_hardware::TunerSim;
use tuner_traits::HardwareChannel;
use tuner_traits::clock::test_clock::TestClock;

fn cfg(increment: u64) -> StepperCfg {
    StepperCfg {
        move_increment: increment,
        ..Rig::stepper_cfg()
    }
}

#[rstest]
#[case(2_500, vec![1_000.0, 1_000.0, 500.0], "pos")]
#[case(-1_500, vec![1_000.0, 500.0], "neg")]
#[case(1_000, vec![1_000.0], "pos")]
fn moves_in_bounded_increments(#[case] delta: i64, #[case] chunks: Vec<f64>, #[case] dir: &str) {
    let rig = Rig::new(TunerSim::default());
    let cfg = cfg(1_000);
    let clock = TestClock::new();
    let stepper = StepperController::new(&rig.cavity, &cfg, &clock);

    stepper.move_steps(delta, cfg.max_steps, cfg.speed).unwrap();

    let ch = rig.cavity.channels();
    let request = if dir == "pos" { &ch.move_pos } else { &ch.move_neg };
    assert_eq!(rig.writes_to(&ch.nsteps), chunks);
    assert_eq!(rig.writes_to(request).len(), chunks.len());
    assert_eq!(rig.writes_to(&ch.max_speed), vec![20_000.0]);
    assert_eq!(rig.value(&ch.step_signed), delta as f64);
    assert_eq!(stepper.phase(), StepperPhase::Idle);
}

#[test]
fn out_of_range_fails_before_touching_hardware() {
    let rig = Rig::new(TunerSim::default());
    let cfg = Rig::stepper_cfg();
    let clock = TestClock::new();
    let stepper = StepperController::new(&rig.cavity, &cfg, &clock);

    let err = stepper.move_steps(-6_000_000, 5_000_000, 20_000).unwrap_err();
    assert!(matches!(
        tuner_err(&err),
        TunerError::OutOfRange {
            requested: -6_000_000,
            max: 5_000_000
        }
    ));
    assert!(rig.sim.writes().is_empty());
}

#[test]
fn abort_between_increments_stops_motion() {
    let rig = Rig::new(TunerSim::default());
    let cfg = cfg(1_000);
    let clock = TestClock::new();
    let stepper = StepperController::new(&rig.cavity, &cfg, &clock);

    // Operator hits abort as soon as the first move is requested.
    let token = rig.cavity.abort_token().clone();
    let ch = rig.cavity.channels();
    let sub = rig
        .sim
        .subscribe(&ch.move_pos, Box::new(move |_, _| token.request()))
        .unwrap();

    let err = stepper.move_steps(3_000, cfg.max_steps, cfg.speed).unwrap_err();
    assert!(matches!(tuner_err(&err), TunerError::Aborted));
    assert_eq!(rig.writes_to(&ch.nsteps), vec![1_000.0]);
    assert_eq!(rig.writes_to(&ch.abort), vec![1.0]);
    assert_eq!(stepper.phase(), StepperPhase::Aborted);
    assert!(rig.cavity.abort_token().is_requested());

    rig.sim.unsubscribe(sub).unwrap();
    rig.cavity.clear_abort();
    assert_eq!(stepper.phase(), StepperPhase::Idle);
    stepper.move_steps(500, cfg.max_steps, cfg.speed).unwrap();
}

#[test]
fn latched_abort_blocks_new_moves() {
    let rig = Rig::new(TunerSim::default());
    let cfg = Rig::stepper_cfg();
    let clock = TestClock::new();
    let stepper = StepperController::new(&rig.cavity, &cfg, &clock);
    rig.cavity.abort_token().request();

    let err = stepper.move_steps(10, cfg.max_steps, cfg.speed).unwrap_err();
    assert!(matches!(tuner_err(&err), TunerError::Aborted));
    assert!(rig.writes_to(&rig.cavity.channels().nsteps).is_empty());
}

#[test]
fn stalled_motion_times_out() {
    let rig = Rig::new(TunerSim {
        motion_stalls: true,
        ..TunerSim::default()
    });
    let cfg = Rig::stepper_cfg();
    let clock = TestClock::new();
    let stepper = StepperController::new(&rig.cavity, &cfg, &clock);

    let err = stepper.move_steps(10, cfg.max_steps, cfg.speed).unwrap_err();
    assert!(matches!(tuner_err(&err), TunerError::Timeout));
    assert!(clock.slept() >= Duration::from_millis(cfg.motion_timeout_ms));
    assert_eq!(stepper.phase(), StepperPhase::Idle);
    assert_eq!(
        rig.value(&rig.cavity.channels().motion_state),
        codes::MOTION_MOVING
    );
}

#[test]
fn reset_is_confirmed_by_readback() {
    let rig = Rig::new(TunerSim {
        step_signed: 4_321.0,
        ..TunerSim::default()
    });
    let cfg = Rig::stepper_cfg();
    let clock = TestClock::new();
    StepperController::new(&rig.cavity, &cfg, &clock)
        .reset_signed_count()
        .unwrap();
    assert_eq!(rig.value(&rig.cavity.channels().step_signed), 0.0);
    assert_eq!(rig.writes_to(&rig.cavity.channels().reset_signed), vec![1.0]);
}

#[test]
fn unresponsive_reset_gives_up_after_bounded_attempts() {
    let rig = Rig::new(TunerSim {
        step_signed: 42.0,
        reset_ignored: true,
        ..TunerSim::default()
    });
    let cfg = StepperCfg {
        reset_attempts: 4,
        ..Rig::stepper_cfg()
    };
    let clock = TestClock::new();
    let err = StepperController::new(&rig.cavity, &cfg, &clock)
        .reset_signed_count()
        .unwrap_err();
    assert!(matches!(
        tuner_err(&err),
        TunerError::ResetNotConfirmed { attempts: 4 }
    ));
    assert_eq!(rig.writes_to(&rig.cavity.channels().reset_signed).len(), 4);
    assert_eq!(clock.slept(), Duration::from_millis(3 * cfg.poll_ms));
}

#[rstest]
#[case(true, 100_000)]
#[case(false, 120_000)]
fn recorded_position_credits_signed_steps(#[case] count_current: bool, #[case] target: i64) {
    let rig = Rig::new(TunerSim {
        step_signed: 20_000.0,
        ..TunerSim::default()
    });
    let cfg = Rig::stepper_cfg();
    let clock = TestClock::new();
    let plan = StepperController::new(&rig.cavity, &cfg, &clock)
        .move_to_recorded_position(120_000, count_current)
        .unwrap();
    assert_eq!(plan.signed_at_start, 20_000);
    assert_eq!(plan.target_steps, target);
    assert_eq!(
        rig.writes_to(&rig.cavity.channels().nsteps),
        vec![target as f64]
    );
}
