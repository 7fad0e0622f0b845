//! One-shot cancellation scope.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::ServiceError;

/// Fires once and stays fired. Every clone observes the same signal.
///
/// Closing twice is reported as [`ServiceError::AlreadyClosed`] instead of
/// being silently ignored.
#[derive(Debug, Clone, Default)]
pub struct DoneSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl DoneSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that also fires when `self` fires.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fires the signal, waking every waiter.
    ///
    /// # Errors
    /// [`ServiceError::AlreadyClosed`] if this signal was already closed.
    pub fn close(&self) -> Result<(), ServiceError> {
        if self.fired.swap(true, Ordering::AcqRel) {
            return Err(ServiceError::AlreadyClosed);
        }
        self.token.cancel();
        Ok(())
    }

    /// True once fired, by `close` or through a parent.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal fires.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
