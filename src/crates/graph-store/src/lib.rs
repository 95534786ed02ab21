//! # graph-store
//!
//! Thread state persistence for the patchwork graph runtime.
//!
//! The runtime executes graphs against *threads*: persistent conversation
//! contexts addressed by UUID. This crate owns the storage side of that
//! model:
//!
//! - [`ThreadSnapshot`] - one versioned snapshot of a thread's channel
//!   values, run status, pending interrupt, and resume/cancel signals
//! - [`ThreadStore`] - the async storage trait with an atomic
//!   compare-and-swap commit protocol
//! - [`InMemoryThreadStore`] - the reference implementation used in tests
//!   and local mode
//!
//! ```text
//!   runner                         ThreadStore
//!     │  get(thread)  ───────────►  read snapshot (version N)
//!     │  run node, merge update
//!     │  update(thread, N, ...)  ─►  CAS commit (version N+1)
//!     │  ...
//!     │  interrupt(thread, ...)  ─►  status = interrupted, payload saved
//!     ▼
//!   resume(thread, response) ─────►  payload cleared, response stashed
//! ```
//!
//! Two commits racing on the same thread serialize: the loser receives a
//! `VersionConflict`, re-reads, re-merges through the graph's reducers, and
//! retries. Threads are only removed by explicit [`ThreadStore::delete`].

pub mod error;
pub mod memory;
pub mod store;
pub mod thread;

pub use error::{Result, StoreError};
pub use memory::InMemoryThreadStore;
pub use store::ThreadStore;
pub use thread::{PendingInterrupt, RunHandle, RunStatus, StateMap, ThreadSnapshot};
