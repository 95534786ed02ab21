//! In-memory thread storage for development and testing
//!
//! [`InMemoryThreadStore`] keeps every thread snapshot in a thread-safe map.
//! Commits hold the write lock for the whole read-check-write, which gives
//! the atomic CAS the [`ThreadStore`] contract requires. Data does not
//! survive a restart; durable deployments implement the trait over a real
//! database.

use crate::error::{Result, StoreError};
use crate::store::ThreadStore;
use crate::thread::{PendingInterrupt, RunStatus, StateMap, ThreadSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread store backed by an `Arc<RwLock<HashMap>>`
#[derive(Clone, Default)]
pub struct InMemoryThreadStore {
    threads: Arc<RwLock<HashMap<Uuid, ThreadSnapshot>>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all threads. Intended for test isolation.
    pub async fn clear(&self) {
        self.threads.write().await.clear();
    }

    /// Number of stored threads.
    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }

    fn check_version(snapshot: &ThreadSnapshot, expected: u64) -> Result<()> {
        if snapshot.version != expected {
            return Err(StoreError::VersionConflict {
                thread_id: snapshot.thread_id,
                expected,
                actual: snapshot.version,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn create(&self, thread_id: Option<Uuid>, initial: StateMap) -> Result<ThreadSnapshot> {
        let id = thread_id.unwrap_or_else(Uuid::new_v4);
        let snapshot = ThreadSnapshot::new(id, initial);
        self.threads.write().await.insert(id, snapshot.clone());
        Ok(snapshot)
    }

    async fn get(&self, thread_id: Uuid) -> Result<ThreadSnapshot> {
        self.threads
            .read()
            .await
            .get(&thread_id)
            .cloned()
            .ok_or(StoreError::ThreadNotFound(thread_id))
    }

    async fn update(
        &self,
        thread_id: Uuid,
        expected_version: u64,
        values: StateMap,
        status: RunStatus,
    ) -> Result<ThreadSnapshot> {
        let mut threads = self.threads.write().await;
        let snapshot = threads
            .get_mut(&thread_id)
            .ok_or(StoreError::ThreadNotFound(thread_id))?;
        Self::check_version(snapshot, expected_version)?;

        snapshot.version += 1;
        snapshot.values = values;
        snapshot.status = status;
        snapshot.updated_at = Utc::now();
        if status != RunStatus::Interrupted {
            snapshot.pending_interrupt = None;
        }
        Ok(snapshot.clone())
    }

    async fn interrupt(
        &self,
        thread_id: Uuid,
        expected_version: u64,
        values: StateMap,
        interrupt: PendingInterrupt,
    ) -> Result<ThreadSnapshot> {
        let mut threads = self.threads.write().await;
        let snapshot = threads
            .get_mut(&thread_id)
            .ok_or(StoreError::ThreadNotFound(thread_id))?;
        Self::check_version(snapshot, expected_version)?;

        snapshot.version += 1;
        snapshot.values = values;
        snapshot.status = RunStatus::Interrupted;
        snapshot.pending_interrupt = Some(interrupt);
        snapshot.updated_at = Utc::now();
        Ok(snapshot.clone())
    }

    async fn resume(&self, thread_id: Uuid, response: Value) -> Result<ThreadSnapshot> {
        let mut threads = self.threads.write().await;
        let snapshot = threads
            .get_mut(&thread_id)
            .ok_or(StoreError::ThreadNotFound(thread_id))?;

        // Resume racing a cancellation is a no-op.
        if snapshot.cancel_requested || snapshot.status == RunStatus::Cancelled {
            return Ok(snapshot.clone());
        }
        if snapshot.pending_interrupt.is_none() {
            return Err(StoreError::NoPendingInterrupt { thread_id });
        }

        snapshot.version += 1;
        snapshot.pending_interrupt = None;
        snapshot.resume_value = Some(response);
        snapshot.status = RunStatus::Busy;
        snapshot.updated_at = Utc::now();
        Ok(snapshot.clone())
    }

    async fn take_resume(&self, thread_id: Uuid) -> Result<Option<Value>> {
        let mut threads = self.threads.write().await;
        let snapshot = threads
            .get_mut(&thread_id)
            .ok_or(StoreError::ThreadNotFound(thread_id))?;
        Ok(snapshot.resume_value.take())
    }

    async fn cancel(&self, thread_id: Uuid) -> Result<ThreadSnapshot> {
        let mut threads = self.threads.write().await;
        let snapshot = threads
            .get_mut(&thread_id)
            .ok_or(StoreError::ThreadNotFound(thread_id))?;

        if !snapshot.cancel_requested {
            snapshot.version += 1;
            snapshot.cancel_requested = true;
            snapshot.updated_at = Utc::now();
        }
        Ok(snapshot.clone())
    }

    async fn clear_cancel(&self, thread_id: Uuid) -> Result<()> {
        let mut threads = self.threads.write().await;
        let snapshot = threads
            .get_mut(&thread_id)
            .ok_or(StoreError::ThreadNotFound(thread_id))?;
        snapshot.cancel_requested = false;
        Ok(())
    }

    async fn delete(&self, thread_id: Uuid) -> Result<()> {
        self.threads.write().await.remove(&thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn initial() -> StateMap {
        let mut values = StateMap::new();
        values.insert("messages".into(), json!([]));
        values
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = InMemoryThreadStore::new();
        let created = store.create(None, initial()).await.unwrap();
        let fetched = store.get(created.thread_id).await.unwrap();

        assert_eq!(fetched.version, 0);
        assert_eq!(fetched.values, created.values);
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_stale_writers() {
        let store = InMemoryThreadStore::new();
        let t = store.create(None, initial()).await.unwrap();

        let committed = store
            .update(t.thread_id, 0, initial(), RunStatus::Busy)
            .await
            .unwrap();
        assert_eq!(committed.version, 1);

        // A writer still holding version 0 must lose.
        let err = store
            .update(t.thread_id, 0, initial(), RunStatus::Idle)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, actual: 1, .. }));
    }

    #[tokio::test]
    async fn interrupt_then_resume_stashes_response() {
        let store = InMemoryThreadStore::new();
        let t = store.create(None, initial()).await.unwrap();

        let interrupted = store
            .interrupt(
                t.thread_id,
                0,
                initial(),
                PendingInterrupt::new("planner", "approve-plan", json!({"plan": ["step 1"]})),
            )
            .await
            .unwrap();
        assert_eq!(interrupted.status, RunStatus::Interrupted);
        assert_eq!(store.list_interrupts(t.thread_id).await.unwrap().len(), 1);

        let resumed = store.resume(t.thread_id, json!(true)).await.unwrap();
        assert_eq!(resumed.status, RunStatus::Busy);
        assert!(resumed.pending_interrupt.is_none());

        let value = store.take_resume(t.thread_id).await.unwrap();
        assert_eq!(value, Some(json!(true)));
        // Consumed exactly once.
        assert_eq!(store.take_resume(t.thread_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn resume_without_interrupt_fails() {
        let store = InMemoryThreadStore::new();
        let t = store.create(None, initial()).await.unwrap();

        let err = store.resume(t.thread_id, json!(true)).await.unwrap_err();
        assert!(matches!(err, StoreError::NoPendingInterrupt { .. }));
    }

    #[tokio::test]
    async fn resume_after_cancel_is_noop() {
        let store = InMemoryThreadStore::new();
        let t = store.create(None, initial()).await.unwrap();
        store
            .interrupt(
                t.thread_id,
                0,
                initial(),
                PendingInterrupt::new("planner", "approve-plan", json!({})),
            )
            .await
            .unwrap();
        store.cancel(t.thread_id).await.unwrap();

        let snapshot = store.resume(t.thread_id, json!(true)).await.unwrap();
        assert!(snapshot.resume_value.is_none());
        assert!(snapshot.cancel_requested);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let store = InMemoryThreadStore::new();
        let t = store.create(None, initial()).await.unwrap();

        let first = store.cancel(t.thread_id).await.unwrap();
        let second = store.cancel(t.thread_id).await.unwrap();
        assert_eq!(first.version, second.version);
        assert!(second.cancel_requested);
    }

    #[tokio::test]
    async fn delete_removes_thread() {
        let store = InMemoryThreadStore::new();
        let t = store.create(None, initial()).await.unwrap();
        store.delete(t.thread_id).await.unwrap();

        assert!(matches!(
            store.get(t.thread_id).await.unwrap_err(),
            StoreError::ThreadNotFound(_)
        ));
    }
}
