//! # sandbox
//!
//! Execution environment lifecycle for the patchwork orchestrator.
//!
//! Runs never touch the host: file edits and shell commands execute inside
//! an isolated sandbox obtained from a [`SandboxProvider`]. This crate owns
//! acquisition and recovery ([`SandboxCoordinator`]), the repository
//! checkout and branch setup, the commit/push protocol
//! ([`git::GitWorkspace`]), and the codebase tree snapshot handed to the
//! planner.
//!
//! Local mode substitutes a mock sandbox and skips the provider entirely;
//! the tools layer then executes against the local shell instead.

pub mod coordinator;
pub mod error;
pub mod git;
pub mod provider;
pub mod tree;
pub mod types;

pub use coordinator::{AcquireResult, SandboxConfig, SandboxCoordinator};
pub use error::{Result, SandboxError};
pub use git::{
    CommitIdentity, CommitOutcome, ExcludeList, GitAuth, GitWorkspace, DEFAULT_EXCLUDE_PATTERNS,
};
pub use provider::{MockProvider, SandboxProvider};
pub use tree::{codebase_tree, render_tree, MAX_TREE_ENTRIES};
pub use types::{
    CreateParams, ExecOutput, ExecRequest, Sandbox, SandboxState, TargetRepository,
    DEFAULT_AUTO_DELETE_MINUTES, LOCAL_MOCK_ID, SANDBOX_ROOT,
};
