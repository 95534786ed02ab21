//! # llm
//!
//! Model routing for the patchwork orchestrator.
//!
//! Agents never hold a model directly; they call through [`ModelRouter`]
//! with a [`TaskClass`] (router, summarizer, planner, programmer). The
//! router:
//!
//! 1. picks the class's primary model,
//! 2. walks the fallback chain on failure,
//! 3. skips models whose [`CircuitBreaker`] circuit is open (half-opening
//!    after a cooldown),
//! 4. strips `parallel_tool_calls` for models that reject it.
//!
//! [`structured_call`] layers schema-validated structured output on top:
//! a forced tool call whose arguments are checked with `jsonschema` before
//! anything trusts them. [`TokenCounter`] provides the approximate counts
//! used by history summarization.

pub mod breaker;
pub mod error;
pub mod router;
pub mod structured;
pub mod tokens;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use error::{LlmError, Result};
pub use router::{ModelChain, ModelRouter, TaskClass};
pub use structured::{structured_call, validate_against_schema, StructuredSpec};
pub use tokens::{TokenCount, TokenCounter};
