use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Terminal failure of a walk. The walk performs a single deterministic
/// pass, so there is no retry and no rollback; visitor side effects that
/// happened before the failure remain observable.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The external visitor returned or threw an error.
    #[error("visitor failed: {0}")]
    Visitor(anyhow::Error),
    /// A producer invocation failed: a function producer, a stateful render,
    /// a consumer callback, or a derived-state computation.
    #[error("producer failed: {0}")]
    Producer(anyhow::Error),
    /// An instance teardown hook failed.
    #[error("teardown failed: {0}")]
    Teardown(anyhow::Error),
}

/// Single failure slot shared by every branch of one walk.
///
/// The first error wins; later errors from branches still in flight are
/// logged and discarded.
#[derive(Debug, Default)]
pub(crate) struct ErrorLatch {
    tripped: AtomicBool,
    slot: Mutex<Option<WalkError>>,
}

impl ErrorLatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn trip(&self, error: WalkError) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(error);
            self.tripped.store(true, Ordering::Release);
        } else {
            debug!("discarding error latched after the first: {error}");
        }
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> Option<WalkError> {
        self.slot.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_wins() {
        let latch = ErrorLatch::new();
        assert!(!latch.is_tripped());

        latch.trip(WalkError::Visitor(anyhow::anyhow!("first")));
        latch.trip(WalkError::Producer(anyhow::anyhow!("second")));
        assert!(latch.is_tripped());

        let error = latch.take().unwrap();
        assert!(matches!(error, WalkError::Visitor(_)));
        assert!(error.to_string().contains("first"));
    }
}
