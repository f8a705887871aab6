mod common;

use common::Rig;
use proptest::prelude::*;
use tuner_core::{AutoTuneCfg, AutoTuneLoop, ChirpRangeSelector, MovePlan};
use tuner_hardware::TunerSim;
use tuner_traits::Reading;
use tuner_traits::clock::test_clock::TestClock;

prop_compose! {
    fn detune()(hz in -1_000_000.0f64..1_000_000.0) -> f64 { hz }
}

proptest! {
    #[test]
    fn known_window_always_brackets_and_grows(a in detune(), b in detune()) {
        let sel = ChirpRangeSelector::default();
        let (lo, hi) = if a.abs() <= b.abs() { (a, b) } else { (b, a) };
        let (wl, wh) = (sel.select(Some(lo), None), sel.select(Some(hi), None));
        prop_assert!(wl <= wh);
        prop_assert!(wl > lo.abs());
    }

    #[test]
    fn unknown_window_is_one_of_the_defaults(live in detune()) {
        let sel = ChirpRangeSelector::default();
        let w = sel.select(None, Some(Reading::ok(live)));
        prop_assert!(w == 200_000.0 || w == 400_000.0);
        let invalid = sel.select(None, Some(Reading::invalid(live)));
        prop_assert_eq!(invalid, 400_000.0);
    }

    #[test]
    fn plan_target_matches_counting_mode(
        recorded in -5_000_000i64..5_000_000,
        signed in -5_000_000i64..5_000_000,
    ) {
        prop_assert_eq!(MovePlan::new(recorded, signed, false).target_steps, recorded);
        prop_assert_eq!(
            MovePlan::new(recorded, signed, true).target_steps + signed,
            recorded
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn autotune_converges_within_budget(
        target in -50_000.0f64..50_000.0,
        offset in -40_000.0f64..40_000.0,
    ) {
        let rig = Rig::new(TunerSim {
            detune_hz: target + offset,
            ..TunerSim::default()
        });
        let stepper = Rig::stepper_cfg();
        let cfg = AutoTuneCfg { settle_ms: 0, ..AutoTuneCfg::default() };
        let clock = TestClock::new();
        let window = target.abs() + 50_000.0;

        let out = AutoTuneLoop::new(&rig.cavity, &stepper, &cfg, &clock)
            .run(target, cfg.tolerance_hz, window)
            .unwrap();

        prop_assert!((out.final_detune_hz - target).abs() <= cfg.tolerance_hz);
        let expected = (offset * 1.4).abs();
        prop_assert!(out.steps_moved as f64 <= cfg.step_overrun_ratio * expected + 1.0);
        prop_assert!(out.iterations <= 4);
    }
}
