//! # tools
//!
//! The tool-execution layer of the patchwork orchestrator: everything
//! between "the model asked for a tool call" and "the side effect
//! happened".
//!
//! - [`ToolRegistry`] / [`Tool`] - `(name, description, schema, executor)`
//!   records keyed by name; [`core::default_registry`] assembles the
//!   standard set
//! - [`ExecBackend`] - dual back-ends: the local shell (local mode, with
//!   bash→sh fallback and non-interactive defaults) or the sandbox
//!   provider's process API, with sandbox↔local path normalization
//! - [`ToolRunner`] - sequential execution of a message's tool calls with
//!   per-call timeouts; failures become error Tool messages the model can
//!   recover from
//! - [`SafetyEvaluator`] - fail-closed command gating in local mode with a
//!   read-only allow-list short-circuit
//! - [`ApprovalKey`] - normalized `(tool, directory)` keys for the write
//!   approval cache

pub mod backend;
pub mod core;
pub mod error;
pub mod executor;
pub mod paths;
pub mod registry;
pub mod safety;

pub use backend::{ExecBackend, LocalExecutor, TIMEOUT_EXIT_CODE};
pub use core::default_registry;
pub use error::{Result, ToolError};
pub use executor::{ToolRunResult, ToolRunner, DEFAULT_TOOL_TIMEOUT};
pub use paths::{
    approval_key_for_call, map_sandbox_path, normalize_path, normalized_dirname, ApprovalKey,
    WRITE_COMMAND_TOOLS,
};
pub use registry::{Tool, ToolContext, ToolOutcome, ToolRegistry, ToolStatus};
pub use safety::{RiskLevel, SafetyEvaluator, SafetyVerdict, COMMAND_TOOLS, READ_ONLY_COMMANDS};
