//! Error types for the agent graphs

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised by the agent graphs
///
/// The manager never crashes on a planner/programmer failure; child runs
/// fail independently and are observed through their thread status.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Missing required state (issue id, repository); fatal to the run.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Source-control, sandbox, or provider failure after retries.
    #[error("External service failure: {0}")]
    External(String),

    /// Recursion limit, token budget, or fallback-chain exhaustion.
    #[error("Budget exhausted: {0}")]
    BudgetExhaustion(String),

    #[error("Plan update rejected: {0}")]
    PlanUpdate(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Graph(#[from] graph_core::GraphError),

    #[error(transparent)]
    Store(#[from] graph_store::StoreError),

    #[error(transparent)]
    Sandbox(#[from] sandbox::SandboxError),

    #[error(transparent)]
    Tool(#[from] tools::ToolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<llm::LlmError> for OrchestratorError {
    fn from(e: llm::LlmError) -> Self {
        match e {
            llm::LlmError::FallbackExhausted { .. } => Self::BudgetExhaustion(e.to_string()),
            other => Self::External(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for graph_core::GraphError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Graph(inner) => inner,
            other => graph_core::GraphError::Custom(other.to_string()),
        }
    }
}
