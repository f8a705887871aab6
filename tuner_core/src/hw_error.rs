//! Maps `Box<dyn Error>` from the channel boundary to typed `TunerError`.
//!
//! `HardwareChannel` uses `Box<dyn Error + Send + Sync>` so any transport can
//! plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `tuner_hardware::HwError` downcasting.

use crate::error::TunerError;

/// Map a channel-boundary error to a typed `TunerError`.
///
/// Attempts to downcast known transport error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> TunerError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<tuner_hardware::HwError>() {
            return match hw {
                tuner_hardware::HwError::Disconnected(_)
                | tuner_hardware::HwError::UnknownChannel(_) => {
                    TunerError::HardwareFault(hw.to_string())
                }
                other => TunerError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        TunerError::Timeout
    } else if lower.contains("disconnected") {
        TunerError::HardwareFault(s)
    } else {
        TunerError::Hardware(s)
    }
}
