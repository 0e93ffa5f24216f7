//! Cooperative run cancellation
//!
//! The caller signals through the token; the executor checks it at state
//! boundaries and after each fan-out batch. A batch whose token was
//! cancelled while items were in flight is abandoned wholesale — its
//! results never reach the pipeline state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one run.
///
/// Clones observe the same flag. Cancellation mid-stage has no effect
/// until the next boundary check.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
