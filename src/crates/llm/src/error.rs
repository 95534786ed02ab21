//! Error types for model routing

use thiserror::Error;

/// Result type alias for routing operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors raised by the model router
#[derive(Error, Debug)]
pub enum LlmError {
    /// Every model in the chain failed or was skipped; fatal to the run.
    #[error("all models failed for {task}: attempted [{}], last error: {last_error}", attempted.join(", "))]
    FallbackExhausted {
        task: String,
        attempted: Vec<String>,
        last_error: String,
    },

    #[error("no model chain registered for task class {0}")]
    NoChain(String),

    /// The model's structured output did not match the declared schema.
    /// Treated as a recoverable tool-execution failure, not a crash.
    #[error("structured output validation failed for '{tool}': {reason}")]
    StructuredOutput { tool: String, reason: String },

    #[error("model returned no tool call for '{tool}'")]
    MissingToolCall { tool: String },

    #[error(transparent)]
    Graph(#[from] graph_core::GraphError),
}
