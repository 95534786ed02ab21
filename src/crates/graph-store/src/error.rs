//! Error types for thread store operations

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by [`ThreadStore`](crate::ThreadStore) implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Thread {0} not found")]
    ThreadNotFound(Uuid),

    #[error("Version conflict on thread {thread_id}: expected {expected}, found {actual}")]
    VersionConflict {
        thread_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid status transition on thread {thread_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        thread_id: Uuid,
        from: crate::thread::RunStatus,
        to: crate::thread::RunStatus,
    },

    #[error("Thread {thread_id} has no pending interrupt to resume")]
    NoPendingInterrupt { thread_id: Uuid },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
