//! Live detune history for the duration of one landing call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tuner_traits::{Clock, HardwareChannel, Reading, SubscriptionId};

use crate::cavity::Cavity;
use crate::error::Result;

type Window = Arc<Mutex<VecDeque<Reading>>>;

/// Subscribes to the cavity's detune readback and keeps the last
/// `history` readings. Unsubscribes on drop.
pub struct DetuneMonitor {
    hw: Arc<dyn HardwareChannel>,
    sub: Option<SubscriptionId>,
    window: Window,
    capacity: usize,
}

fn push(window: &Window, history: usize, r: Reading) {
    let mut w = window.lock().unwrap_or_else(|p| p.into_inner());
    w.push_back(r);
    while w.len() > history {
        w.pop_front();
    }
}

impl DetuneMonitor {
    pub fn start(cavity: &Cavity, history: usize) -> Result<Self> {
        let history = history.max(1);
        let window: Window = Arc::new(Mutex::new(VecDeque::with_capacity(history)));
        push(&window, history, cavity.detune()?);

        let sink = window.clone();
        let hw = cavity.hw().clone();
        let name = &cavity.channels().detune;
        let sub = hw
            .subscribe(name, Box::new(move |_, r| push(&sink, history, r)))
            .map_err(|e| eyre::Report::new(crate::hw_error::map_hw_error(e.as_ref())))?;
        tracing::trace!(channel = %name, "detune monitor subscribed");
        Ok(Self {
            hw,
            sub: Some(sub),
            window,
            capacity: history,
        })
    }

    /// Poll the readback every `interval` until the window is full.
    /// Subscription updates that arrive meanwhile count toward it.
    pub fn fill(&self, cavity: &Cavity, clock: &dyn Clock, interval: Duration) -> Result<()> {
        while self.lock().len() < self.capacity {
            cavity.abort_token().check()?;
            clock.sleep(interval);
            push(&self.window, self.capacity, cavity.detune()?);
        }
        tracing::debug!(cavity = %cavity.id(), samples = self.capacity, "detune history filled");
        Ok(())
    }

    pub fn latest(&self) -> Option<Reading> {
        self.lock().back().copied()
    }

    pub fn history(&self) -> Vec<Reading> {
        self.lock().iter().copied().collect()
    }

    /// Latest reading, but only when every reading in the window is valid.
    pub fn stable_reading(&self) -> Option<Reading> {
        let w = self.lock();
        if w.iter().all(Reading::is_valid) {
            w.back().copied()
        } else {
            None
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Reading>> {
        self.window.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for DetuneMonitor {
    fn drop(&mut self) {
        if let Some(id) = self.sub.take()
            && let Err(e) = self.hw.unsubscribe(id)
        {
            tracing::warn!(error = %e, "detune monitor unsubscribe failed");
        }
    }
}
