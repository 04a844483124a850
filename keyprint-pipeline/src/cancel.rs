//! Cooperative cancellation shared between the producer and the workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clonable stop flag. All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. The producer notices at its next backoff point and
    /// each worker before taking its next frame.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
