//! In-memory register store that behaves like a control-system transport.
//!
//! Registers must be declared (`insert`) before use; unknown names fail the
//! same way a missing process variable would. Devices are modelled by
//! [`WriteHook`]s which run under the store lock and may update other
//! registers. Subscribers are notified after the lock is released, once per
//! put to the written register and once per derived change.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tuner_traits::{Callback, ChannelError, HardwareChannel, Reading, Severity, SubscriptionId};

use crate::error::{HwError, Result};

/// Device behaviour attached to a set of registers.
pub trait WriteHook: Send + Sync {
    /// Called after `name` has been set to `value`.
    fn on_write(&self, regs: &mut Registers, name: &str, value: f64);
}

/// Mutable view of the register table handed to hooks.
pub struct Registers {
    values: HashMap<String, Reading>,
    changed: Vec<String>,
}

impl Registers {
    pub fn get(&self, name: &str) -> Option<Reading> {
        self.values.get(name).copied()
    }

    pub fn value(&self, name: &str) -> f64 {
        self.values.get(name).map(|r| r.value).unwrap_or(0.0)
    }

    /// Set a register, recording it for subscriber notification when the
    /// reading actually changes.
    pub fn set(&mut self, name: &str, reading: Reading) {
        let prev = self.values.insert(name.to_string(), reading);
        if prev != Some(reading) {
            self.changed.push(name.to_string());
        }
    }

    pub fn set_value(&mut self, name: &str, value: f64) {
        let severity = self
            .values
            .get(name)
            .map(|r| r.severity)
            .unwrap_or_default();
        self.set(name, Reading::new(value, severity));
    }

    fn take_changed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.changed)
    }
}

/// One recorded put, for assertions in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub name: String,
    pub value: f64,
    pub wait: bool,
}

struct Store {
    regs: Registers,
    hooks: Vec<(String, Arc<dyn WriteHook>)>,
    disconnected: HashSet<String>,
    writes: Vec<WriteRecord>,
}

/// Thread-safe simulated transport.
pub struct SimulatedChannels {
    store: Mutex<Store>,
    subs: Mutex<HashMap<u64, (String, Arc<Callback>)>>,
    next_sub: AtomicU64,
}

impl Default for SimulatedChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SimulatedChannels {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let registers = self.lock().regs.values.len();
        f.debug_struct("SimulatedChannels")
            .field("registers", &registers)
            .finish()
    }
}

impl SimulatedChannels {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                regs: Registers {
                    values: HashMap::new(),
                    changed: Vec::new(),
                },
                hooks: Vec::new(),
                disconnected: HashSet::new(),
                writes: Vec::new(),
            }),
            subs: Mutex::new(HashMap::new()),
            next_sub: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A panicking hook must not wedge every other cavity.
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Declare a register with an initial value.
    pub fn insert(&self, name: &str, value: f64) {
        self.lock()
            .regs
            .values
            .insert(name.to_string(), Reading::ok(value));
    }

    /// Force a reading (value and severity) and notify subscribers.
    pub fn set(&self, name: &str, reading: Reading) {
        let changed = {
            let mut store = self.lock();
            store.regs.set(name, reading);
            store.regs.take_changed()
        };
        self.notify(changed);
    }

    /// Current value, ignoring severity.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.lock().regs.get(name).map(|r| r.value)
    }

    /// Attach a device model to every register starting with `prefix`.
    pub fn add_hook(&self, prefix: &str, hook: Arc<dyn WriteHook>) {
        self.lock().hooks.push((prefix.to_string(), hook));
    }

    /// Reads of `name` report `Invalid` severity and puts fail.
    pub fn disconnect(&self, name: &str) {
        self.lock().disconnected.insert(name.to_string());
    }

    pub fn reconnect(&self, name: &str) {
        self.lock().disconnected.remove(name);
    }

    /// Every put issued so far, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Puts to a single register, in order.
    pub fn writes_to(&self, name: &str) -> Vec<f64> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.name == name)
            .map(|w| w.value)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    fn do_write(&self, name: &str, value: f64, wait: bool) -> Result<Vec<String>> {
        let mut store = self.lock();
        if store.disconnected.contains(name) {
            return Err(HwError::Disconnected(name.to_string()));
        }
        if store.regs.get(name).is_none() {
            return Err(HwError::UnknownChannel(name.to_string()));
        }
        store.writes.push(WriteRecord {
            name: name.to_string(),
            value,
            wait,
        });
        store.regs.set_value(name, value);
        let hooks: Vec<Arc<dyn WriteHook>> = store
            .hooks
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .map(|(_, h)| h.clone())
            .collect();
        for hook in hooks {
            hook.on_write(&mut store.regs, name, value);
        }
        let mut changed = store.regs.take_changed();
        if !changed.iter().any(|c| c == name) {
            changed.insert(0, name.to_string());
        }
        Ok(changed)
    }

    fn notify(&self, changed: Vec<String>) {
        if changed.is_empty() {
            return;
        }
        let targets: Vec<(String, Arc<Callback>)> = {
            let subs = self.subs.lock().unwrap_or_else(|p| p.into_inner());
            subs.values()
                .filter(|(name, _)| changed.contains(name))
                .map(|(name, cb)| (name.clone(), cb.clone()))
                .collect()
        };
        for (name, cb) in targets {
            let reading = {
                let store = self.lock();
                match store.regs.get(&name) {
                    Some(r) if store.disconnected.contains(&name) => Reading::invalid(r.value),
                    Some(r) => r,
                    None => continue,
                }
            };
            cb(&name, reading);
        }
    }
}

impl HardwareChannel for SimulatedChannels {
    fn read(&self, name: &str) -> std::result::Result<Reading, ChannelError> {
        let store = self.lock();
        let reading = store
            .regs
            .get(name)
            .ok_or_else(|| HwError::UnknownChannel(name.to_string()))?;
        if store.disconnected.contains(name) {
            return Ok(Reading::new(reading.value, Severity::Invalid));
        }
        Ok(reading)
    }

    fn write(&self, name: &str, value: f64, wait: bool) -> std::result::Result<(), ChannelError> {
        let changed = self.do_write(name, value, wait)?;
        tracing::trace!(channel = name, value, wait, "sim put");
        self.notify(changed);
        Ok(())
    }

    fn subscribe(
        &self,
        name: &str,
        callback: Callback,
    ) -> std::result::Result<SubscriptionId, ChannelError> {
        if self.lock().regs.get(name).is_none() {
            return Err(Box::new(HwError::UnknownChannel(name.to_string())));
        }
        let id = self.next_sub.fetch_add(1, Ordering::Relaxed);
        self.subs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, (name.to_string(), Arc::new(callback)));
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> std::result::Result<(), ChannelError> {
        let removed = self
            .subs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id.0);
        match removed {
            Some(_) => Ok(()),
            None => Err(Box::new(HwError::UnknownSubscription(id.0))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn unknown_channel_is_an_error_not_a_zero() {
        let sim = SimulatedChannels::new();
        assert!(sim.read("NOPE").is_err());
        assert!(sim.write("NOPE", 1.0, true).is_err());
    }

    #[test]
    fn disconnected_reads_invalid_and_rejects_puts() {
        let sim = SimulatedChannels::new();
        sim.insert("A", 0.0);
        sim.disconnect("A");
        let r = sim.read("A").unwrap();
        assert_eq!(r.severity, Severity::Invalid);
        assert!(sim.write("A", 1.0, false).is_err());
        sim.reconnect("A");
        assert!(sim.read("A").unwrap().is_valid());
    }

    #[test]
    fn subscribers_see_every_put_until_unsubscribed() {
        let sim = SimulatedChannels::new();
        sim.insert("A", 0.0);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = sim
            .subscribe(
                "A",
                Box::new(move |_, _| {
                    h.fetch_add(1, Ordering::Relaxed);
                }),
            )
            .unwrap();
        sim.write("A", 1.0, true).unwrap();
        sim.write("A", 1.0, true).unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 2);
        sim.unsubscribe(id).unwrap();
        sim.write("A", 2.0, true).unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert!(sim.unsubscribe(id).is_err());
    }

    struct Mirror;
    impl WriteHook for Mirror {
        fn on_write(&self, regs: &mut Registers, name: &str, value: f64) {
            if name == "DEV:CTRL" {
                regs.set_value("DEV:STATE", value);
            }
        }
    }

    #[test]
    fn hooks_update_derived_registers() {
        let sim = SimulatedChannels::new();
        sim.insert("DEV:CTRL", 0.0);
        sim.insert("DEV:STATE", 0.0);
        sim.add_hook("DEV:", Arc::new(Mirror));
        sim.write("DEV:CTRL", 1.0, true).unwrap();
        assert_eq!(sim.value("DEV:STATE"), Some(1.0));
        assert_eq!(sim.writes_to("DEV:CTRL"), vec![1.0]);
    }
}
