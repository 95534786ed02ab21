//! Error types for graph construction and execution

use thiserror::Error;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while building or running graphs
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph validation failed: {0}")]
    Validation(String),

    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution { node: String, error: String },

    #[error("Reducer for field '{field}' failed: {error}")]
    Reducer { field: String, error: String },

    #[error("Recursion limit of {limit} steps exceeded at node '{node}'")]
    RecursionLimit { limit: usize, node: String },

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("No outgoing route from node '{node}'")]
    NoRoute { node: String },

    #[error("Unknown graph '{0}'")]
    UnknownGraph(String),

    #[error("Store error: {0}")]
    Store(#[from] graph_store::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("{0}")]
    Custom(String),
}

impl GraphError {
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn reducer(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Reducer {
            field: field.into(),
            error: error.into(),
        }
    }
}
