//! Cooperative cancellation for pipeline runs.
//!
//! Cancellation is checked between phases and between parallel sub-tasks,
//! never preemptively: in-flight external calls run to completion and their
//! results are discarded. The hot path is a lock-free atomic load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one run.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread, any number of
    /// times.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Error-typed checkpoint for use at phase and sub-task boundaries.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled("run cancelled by caller".to_string()))
        } else {
            Ok(())
        }
    }
}
