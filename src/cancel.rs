use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{IntrospectError, Result};

/// Shared cancellation flag threaded through every read loop.
///
/// The engine trips it when an operation loses its timeout race so the
/// blocking worker stops reading and releases its input.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag has been tripped
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(IntrospectError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancellationFlag::new();
        let worker_view = flag.clone();
        assert!(worker_view.check().is_ok());

        flag.cancel();
        assert!(worker_view.is_cancelled());
        assert!(matches!(worker_view.check(), Err(IntrospectError::Cancelled)));
    }
}
