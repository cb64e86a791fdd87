//! Cooperative cancellation shared between the Ctrl-C handler and tasks.
//!
//! The handler only sets the flag; [`super::sync_entries::SyncEntries`]
//! checks it between entries, so an entry is never interrupted mid-copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context as _, Result};

/// A cheaply-clonable flag recording whether the run was interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Create a new signal in the "not cancelled" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`Self::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Install a process-wide Ctrl-C handler that cancels this signal.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler is already installed.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let signal = self.clone();
        ctrlc::set_handler(move || signal.cancel()).context("installing Ctrl-C handler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signal_is_not_cancelled() {
        assert!(!CancelSignal::new().is_cancelled());
    }

    #[test]
    fn cancel_sets_flag() {
        let sig = CancelSignal::new();
        sig.cancel();
        assert!(sig.is_cancelled());
    }

    #[test]
    fn clone_sees_same_state() {
        let sig = CancelSignal::new();
        let cloned = sig.clone();
        sig.cancel();
        assert!(cloned.is_cancelled());
    }
}
