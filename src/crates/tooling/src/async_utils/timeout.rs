//! Timeout utilities for async operations

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;

/// Error type for timed operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("operation failed: {0}")]
    OperationFailed(E),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl<E> TimeoutError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }
}

/// Execute an async operation with a timeout
///
/// Distinguishes "the operation failed" from "the clock ran out" so callers
/// can report timeouts explicitly instead of failing silently.
pub async fn with_timeout<F, T, E>(
    duration: Duration,
    operation: F,
) -> std::result::Result<T, TimeoutError<E>>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    match tokio_timeout(duration, operation).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(error)) => Err(TimeoutError::OperationFailed(error)),
        Err(_elapsed) => Err(TimeoutError::Timeout(duration)),
    }
}
