//! Cooperative cancellation latch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, TunerError};

/// Shared abort latch. Clones observe the same flag.
///
/// Set from outside (operator, Ctrl-C, another thread), polled by the
/// running operation at every checkpoint. Nothing in the landing procedure
/// clears it; the caller acknowledges an abort with [`AbortToken::clear`].
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with `TunerError::Aborted` while the latch is set.
    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_requested() {
            return Err(eyre::Report::new(TunerError::Aborted));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_latch_and_it_stays_set() {
        let token = AbortToken::new();
        let remote = token.clone();
        assert!(token.check().is_ok());
        remote.request();
        assert!(token.is_requested());
        let err = token.check().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TunerError>(),
            Some(TunerError::Aborted)
        ));
        // still set after being observed
        assert!(token.check().is_err());
        token.clear();
        assert!(remote.check().is_ok());
    }
}
