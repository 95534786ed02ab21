//! Thread snapshot and run status types
//!
//! A thread is the unit of persistence for the graph runtime: one versioned
//! snapshot of state values plus run status, pending interrupt, and the
//! resume/cancel signals consumed by the runner at node boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// State values held by a thread, keyed by channel name
pub type StateMap = serde_json::Map<String, Value>;

/// Execution status of the most recent run on a thread
///
/// Transitions are driven by the runner: `NotStarted -> Busy` when a run
/// begins, `Busy -> Idle` on normal completion, `Busy -> Interrupted` when a
/// node suspends, `Interrupted -> Busy` on resume, `Busy -> Error` on node
/// failure, and `Busy -> Cancelled` when a cancellation lands at a node
/// boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Busy,
    Idle,
    Interrupted,
    Error,
    Cancelled,
}

impl RunStatus {
    /// Whether a new run may begin from this status
    pub fn can_start_run(&self) -> bool {
        !matches!(self, RunStatus::Busy)
    }
}

/// An interrupt raised by a node, awaiting a human response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    /// Unique id for this interrupt
    pub id: Uuid,

    /// Graph whose run raised the interrupt; resume replays against it
    pub graph_id: String,

    /// Node that raised the interrupt; replayed on resume
    pub node: String,

    /// Payload surfaced to the human (proposed plan, tool call, ...)
    pub payload: Value,

    /// When the interrupt was raised
    pub raised_at: DateTime<Utc>,
}

impl PendingInterrupt {
    pub fn new(graph_id: impl Into<String>, node: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            graph_id: graph_id.into(),
            node: node.into(),
            payload,
            raised_at: Utc::now(),
        }
    }
}

/// Identifies one execution of a graph against a thread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunHandle {
    pub thread_id: Uuid,
    pub run_id: Uuid,
    pub graph_id: String,
    pub status: RunStatus,
}

impl RunHandle {
    pub fn new(thread_id: Uuid, graph_id: impl Into<String>) -> Self {
        Self {
            thread_id,
            run_id: Uuid::new_v4(),
            graph_id: graph_id.into(),
            status: RunStatus::NotStarted,
        }
    }
}

/// One versioned snapshot of a thread
///
/// The `version` field increases by exactly one on every successful commit;
/// commits carry the version they read so two concurrent writers cannot both
/// win (the loser re-reads, re-merges, and retries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub thread_id: Uuid,

    /// Monotonic commit counter, starting at 0 for a freshly created thread
    pub version: u64,

    /// Channel values, merged by the runtime's per-field reducers
    pub values: StateMap,

    pub status: RunStatus,

    /// Set while status is `Interrupted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,

    /// Human response stashed by `resume`, consumed once by the runner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_value: Option<Value>,

    /// Set by `cancel`; observed by the runner at the next node boundary
    pub cancel_requested: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadSnapshot {
    pub fn new(thread_id: Uuid, values: StateMap) -> Self {
        let now = Utc::now();
        Self {
            thread_id,
            version: 0,
            values,
            status: RunStatus::NotStarted,
            pending_interrupt: None,
            resume_value: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a single channel value
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_gates_new_runs() {
        assert!(RunStatus::NotStarted.can_start_run());
        assert!(RunStatus::Idle.can_start_run());
        assert!(RunStatus::Interrupted.can_start_run());
        assert!(!RunStatus::Busy.can_start_run());
    }

    #[test]
    fn snapshot_starts_at_version_zero() {
        let mut values = StateMap::new();
        values.insert("messages".into(), json!([]));
        let snapshot = ThreadSnapshot::new(Uuid::new_v4(), values);

        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.status, RunStatus::NotStarted);
        assert!(snapshot.pending_interrupt.is_none());
        assert!(!snapshot.cancel_requested);
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&RunStatus::NotStarted).unwrap();
        assert_eq!(s, "\"not_started\"");
        let s = serde_json::to_string(&RunStatus::Interrupted).unwrap();
        assert_eq!(s, "\"interrupted\"");
    }
}
