//! Measurement window sizing.

use tuner_traits::Reading;

use crate::config::ChirpCfg;

/// Picks a chirp half-width that brackets the expected detune.
#[derive(Debug, Clone, Default)]
pub struct ChirpRangeSelector {
    cfg: ChirpCfg,
}

impl ChirpRangeSelector {
    pub fn new(cfg: ChirpCfg) -> Self {
        Self { cfg }
    }

    /// `|known| + guard` when an estimate exists. Otherwise the small default
    /// if `live` is usable and already small, else the large default.
    pub fn select(&self, known: Option<f64>, live: Option<Reading>) -> f64 {
        if let Some(k) = known.filter(|k| k.is_finite()) {
            return k.abs() + self.cfg.guard_band_hz;
        }
        match live.and_then(|r| r.present()) {
            Some(d) if d.abs() < self.cfg.small_detune_hz => self.cfg.small_default_hz,
            _ => self.cfg.large_default_hz,
        }
    }

    /// Detune estimate for a step count.
    pub fn from_steps(steps: i64, steps_per_hz: f64) -> f64 {
        steps as f64 / steps_per_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(45_000.0), None, 95_000.0)]
    #[case(Some(-45_000.0), None, 95_000.0)]
    #[case(None, Some(Reading::ok(-20_000.0)), 200_000.0)]
    #[case(None, Some(Reading::ok(160_000.0)), 400_000.0)]
    #[case(None, Some(Reading::invalid(1_000.0)), 400_000.0)]
    #[case(None, Some(Reading::ok(0.0)), 400_000.0)]
    #[case(None, None, 400_000.0)]
    fn selection_table(
        #[case] known: Option<f64>,
        #[case] live: Option<Reading>,
        #[case] expected: f64,
    ) {
        let sel = ChirpRangeSelector::default();
        assert_eq!(sel.select(known, live), expected);
    }

    #[test]
    fn step_estimate() {
        assert_eq!(ChirpRangeSelector::from_steps(140_000, 1.4), 100_000.0);
    }
}
