//! Blocking wait helpers shared by the stepper and the auto-tune loop.

use std::time::Duration;

use tuner_traits::Clock;

use crate::abort::AbortToken;
use crate::error::{Result, TunerError};

/// Poll `done` every `every` until it reports true.
///
/// Checks `abort` before each poll. Fails with `TunerError::Timeout` once
/// `timeout` has elapsed on `clock` without `done` succeeding.
pub fn poll_until<F>(
    clock: &dyn Clock,
    timeout: Duration,
    every: Duration,
    abort: &AbortToken,
    mut done: F,
) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let start = clock.now();
    loop {
        abort.check()?;
        if done()? {
            return Ok(());
        }
        if clock.expired(start, timeout) {
            return Err(eyre::Report::new(TunerError::Timeout));
        }
        clock.sleep(every);
    }
}

/// Sleep for `total`, waking every `every` to honour `abort`.
pub fn pause(clock: &dyn Clock, total: Duration, every: Duration, abort: &AbortToken) -> Result<()> {
    let every = every.max(Duration::from_millis(1));
    let mut left = total;
    while !left.is_zero() {
        abort.check()?;
        let chunk = left.min(every);
        clock.sleep(chunk);
        left = left.saturating_sub(chunk);
    }
    abort.check()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tuner_traits::clock::test_clock::TestClock;

    #[test]
    fn poll_until_returns_once_done() {
        let clock = TestClock::new();
        let n = Cell::new(0);
        poll_until(
            &clock,
            Duration::from_secs(1),
            Duration::from_millis(10),
            &AbortToken::new(),
            || {
                n.set(n.get() + 1);
                Ok(n.get() == 3)
            },
        )
        .unwrap();
        assert_eq!(clock.slept(), Duration::from_millis(20));
    }

    #[test]
    fn poll_until_times_out() {
        let clock = TestClock::new();
        let err = poll_until(
            &clock,
            Duration::from_millis(50),
            Duration::from_millis(10),
            &AbortToken::new(),
            || Ok(false),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TunerError>(),
            Some(TunerError::Timeout)
        ));
    }

    #[test]
    fn pause_stops_early_on_abort() {
        let clock = TestClock::new();
        let abort = AbortToken::new();
        abort.request();
        assert!(pause(&clock, Duration::from_secs(5), Duration::from_millis(100), &abort).is_err());
        assert_eq!(clock.slept(), Duration::ZERO);
    }

    #[test]
    fn pause_sleeps_in_chunks() {
        let clock = TestClock::new();
        pause(
            &clock,
            Duration::from_millis(250),
            Duration::from_millis(100),
            &AbortToken::new(),
        )
        .unwrap();
        assert_eq!(clock.slept(), Duration::from_millis(250));
    }
}
