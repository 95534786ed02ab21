//! Extensible thread storage trait for custom backend implementations
//!
//! [`ThreadStore`] is the persistence seam of the graph runtime. The runner
//! reads a snapshot before each node, merges the node's update through the
//! graph's reducers, and commits the merged values together with the new run
//! status. Implementations must provide atomic compare-and-swap commits so
//! that two runs racing on one thread serialize instead of losing writes.
//!
//! The in-memory reference implementation lives in
//! [`memory`](crate::memory); durable backends (SQLite, Postgres, ...) plug
//! in by implementing this trait.

use crate::error::Result;
use crate::thread::{PendingInterrupt, RunStatus, StateMap, ThreadSnapshot};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Storage backend for thread state
///
/// # Commit protocol
///
/// Every mutation carries the `expected_version` the caller read. The store
/// MUST reject the commit with [`StoreError::VersionConflict`]
/// (crate::StoreError::VersionConflict) when the stored version differs, and
/// MUST apply commit + version bump atomically. Callers handle a conflict by
/// re-reading, re-merging, and retrying.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Create a new thread with the given initial channel values.
    ///
    /// When `thread_id` is `None` a fresh UUID is allocated.
    async fn create(&self, thread_id: Option<Uuid>, initial: StateMap) -> Result<ThreadSnapshot>;

    /// Fetch the current snapshot of a thread.
    async fn get(&self, thread_id: Uuid) -> Result<ThreadSnapshot>;

    /// Commit merged values and a new status (CAS on `expected_version`).
    ///
    /// Clears any consumed resume value. Does not touch the pending
    /// interrupt; use [`interrupt`](Self::interrupt) to suspend.
    async fn update(
        &self,
        thread_id: Uuid,
        expected_version: u64,
        values: StateMap,
        status: RunStatus,
    ) -> Result<ThreadSnapshot>;

    /// Commit merged values and suspend the thread on an interrupt.
    async fn interrupt(
        &self,
        thread_id: Uuid,
        expected_version: u64,
        values: StateMap,
        interrupt: PendingInterrupt,
    ) -> Result<ThreadSnapshot>;

    /// List pending interrupts (zero or one per thread in this model).
    async fn list_interrupts(&self, thread_id: Uuid) -> Result<Vec<PendingInterrupt>> {
        let snapshot = self.get(thread_id).await?;
        Ok(snapshot.pending_interrupt.into_iter().collect())
    }

    /// Provide the human response for a pending interrupt.
    ///
    /// Clears the interrupt, stashes the response for the runner, and moves
    /// the thread back to `Busy`. Fails when no interrupt is pending. A
    /// resume on a thread that was concurrently cancelled is a no-op and
    /// returns the unchanged snapshot.
    async fn resume(&self, thread_id: Uuid, response: Value) -> Result<ThreadSnapshot>;

    /// Take (and clear) a stashed resume value.
    async fn take_resume(&self, thread_id: Uuid) -> Result<Option<Value>>;

    /// Request cancellation; the runner observes the flag at the next node
    /// boundary. Idempotent.
    async fn cancel(&self, thread_id: Uuid) -> Result<ThreadSnapshot>;

    /// Clear the cancellation flag once a run has terminated.
    async fn clear_cancel(&self, thread_id: Uuid) -> Result<()>;

    /// Delete a thread and all its state. Threads are only ever removed by
    /// explicit delete.
    async fn delete(&self, thread_id: Uuid) -> Result<()>;
}
