use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::GzblockError;

/// First-error-wins slot shared by every thread of one pipeline run.
#[derive(Debug, Default)]
pub struct FailureSlot {
    failed: AtomicBool,
    first: Mutex<Option<GzblockError>>,
}

impl FailureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `error` if no error was recorded yet and returns whether it was kept.
    ///
    /// Later errors are logged and dropped.
    pub fn record(&self, error: GzblockError) -> bool {
        let mut first = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            tracing::debug!(error = %error, "pipeline failure recorded");
            *first = Some(error);
            self.failed.store(true, Ordering::Release);
            return true;
        }
        drop(first);

        if error.is_cancelled() {
            tracing::trace!("cancellation observed after pipeline failure");
        } else {
            tracing::warn!(error = %error, "discarding secondary pipeline error");
        }
        false
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Removes and returns the recorded error.
    pub fn take(&self) -> Option<GzblockError> {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_first_error() {
        let slot = FailureSlot::new();
        assert!(!slot.is_failed());
        assert!(slot.record(GzblockError::InvalidFormat("first")));
        assert!(!slot.record(GzblockError::InvalidFormat("second")));
        assert!(slot.is_failed());

        match slot.take() {
            Some(GzblockError::InvalidFormat(message)) => assert_eq!(message, "first"),
            other => panic!("unexpected slot contents: {other:?}"),
        }
        assert!(slot.take().is_none());
    }
}
