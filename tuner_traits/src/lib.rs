//! Collaborator contracts for the tuner stack.
//!
//! Everything that touches a physical register goes through [`HardwareChannel`];
//! everything that waits goes through [`Clock`]. Both are object-safe so the
//! core can hold them behind `Arc<dyn ...>`.

pub mod clock;
pub mod registers;

pub use clock::{Clock, MonotonicClock};

/// Error type crossing the channel boundary. Transports box their own error
/// types; the core maps them back to typed errors.
pub type ChannelError = Box<dyn std::error::Error + Send + Sync>;

/// Alarm severity attached to every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    /// Disconnected or otherwise unusable; the value must not be trusted.
    Invalid,
}

impl Severity {
    /// Numeric code as published by the control system (0..=3).
    pub fn code(self) -> u8 {
        match self {
            Severity::NoAlarm => 0,
            Severity::Minor => 1,
            Severity::Major => 2,
            Severity::Invalid => 3,
        }
    }
}

/// One value read from a channel together with its quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub severity: Severity,
}

impl Reading {
    pub fn new(value: f64, severity: Severity) -> Self {
        Self { value, severity }
    }

    /// A reading with no alarm attached.
    pub fn ok(value: f64) -> Self {
        Self::new(value, Severity::NoAlarm)
    }

    /// A reading from a disconnected or invalid channel.
    pub fn invalid(value: f64) -> Self {
        Self::new(value, Severity::Invalid)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.severity != Severity::Invalid && self.value.is_finite()
    }

    /// `Some(value)` only for a valid, non-zero value.
    ///
    /// Several registers use zero to mean "never recorded", so a valid zero
    /// and an invalid reading both come back as `None` here. Use
    /// [`Reading::is_valid`] when the distinction matters.
    #[inline]
    pub fn present(&self) -> Option<f64> {
        if self.is_valid() && self.value != 0.0 {
            Some(self.value)
        } else {
            None
        }
    }
}

/// Handle returned by [`HardwareChannel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Value-changed callback: receives the channel name and the new reading.
pub type Callback = Box<dyn Fn(&str, Reading) + Send + Sync>;

/// Typed access to named hardware registers.
///
/// Implementations must be safe to share between threads: independent
/// cavities read and write distinct channels concurrently through one
/// transport.
pub trait HardwareChannel: Send + Sync {
    fn read(&self, name: &str) -> Result<Reading, ChannelError>;

    /// Write `value`. With `wait` the call returns only once the device has
    /// confirmed the put.
    fn write(&self, name: &str, value: f64, wait: bool) -> Result<(), ChannelError>;

    fn subscribe(&self, name: &str, callback: Callback) -> Result<SubscriptionId, ChannelError>;

    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChannelError>;
}

impl<T: HardwareChannel + ?Sized> HardwareChannel for std::sync::Arc<T> {
    fn read(&self, name: &str) -> Result<Reading, ChannelError> {
        (**self).read(name)
    }
    fn write(&self, name: &str, value: f64, wait: bool) -> Result<(), ChannelError> {
        (**self).write(name, value, wait)
    }
    fn subscribe(&self, name: &str, callback: Callback) -> Result<SubscriptionId, ChannelError> {
        (**self).subscribe(name, callback)
    }
    fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChannelError> {
        (**self).unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_zero_is_not_present() {
        let r = Reading::ok(0.0);
        assert!(r.is_valid());
        assert_eq!(r.present(), None);
    }

    #[test]
    fn invalid_value_is_not_present() {
        let r = Reading::invalid(12_000.0);
        assert!(!r.is_valid());
        assert_eq!(r.present(), None);
    }

    #[test]
    fn minor_alarm_is_still_usable() {
        let r = Reading::new(-4_500.0, Severity::Minor);
        assert_eq!(r.present(), Some(-4_500.0));
        assert_eq!(Severity::Invalid.code(), 3);
    }

    #[test]
    fn nan_is_never_valid() {
        assert!(!Reading::ok(f64::NAN).is_valid());
    }
}
