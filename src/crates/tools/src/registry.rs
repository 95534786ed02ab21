//! Tool records and the registry
//!
//! A tool is a `(name, description, schema, executor)` record. The registry
//! keys tools by name, exposes their [`ToolDefinition`]s for model binding,
//! and dispatches execution. Executors receive the parsed arguments plus a
//! [`ToolContext`] carrying a state snapshot and the execution back-end.

use crate::backend::ExecBackend;
use crate::error::{Result, ToolError};
use graph_core::{StateMap, ToolDefinition};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Outcome status of a tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Error,
}

/// Result of one tool execution
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Text handed back to the model as the Tool message content
    pub result: String,

    pub status: ToolStatus,

    /// Optional state update merged into the thread by the calling node
    pub state_updates: Option<StateMap>,
}

impl ToolOutcome {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            status: ToolStatus::Success,
            state_updates: None,
        }
    }

    pub fn error(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            status: ToolStatus::Error,
            state_updates: None,
        }
    }

    pub fn with_state_updates(mut self, updates: StateMap) -> Self {
        self.state_updates = Some(updates);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// Context handed to every tool executor
#[derive(Clone)]
pub struct ToolContext {
    /// Snapshot of the thread state at dispatch time
    pub state: StateMap,

    pub backend: ExecBackend,

    pub http: reqwest::Client,

    /// Per-call timeout applied by the runner
    pub timeout: Duration,
}

impl ToolContext {
    pub fn new(state: StateMap, backend: ExecBackend) -> Self {
        Self {
            state,
            backend,
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read a state channel value.
    pub fn state_value(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }
}

/// Future returned by a tool executor
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolOutcome>> + Send>>;

/// Tool executor function
pub type ToolExec = Arc<dyn Fn(Value, ToolContext) -> ToolFuture + Send + Sync>;

/// A registered tool
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,

    /// JSON Schema for the arguments
    pub schema: Value,

    executor: ToolExec,
}

impl Tool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        executor: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> ToolFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            executor: Arc::new(executor),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description).with_parameters(self.schema.clone())
    }

    pub async fn execute(&self, args: Value, ctx: ToolContext) -> Result<ToolOutcome> {
        (self.executor)(args, ctx).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("executor", &"<function>")
            .finish()
    }
}

/// Name-keyed table of tools
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) {
        if !self.tools.contains_key(&tool.name) {
            self.order.push(tool.name.clone());
        }
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Definitions in registration order, for binding to a chat request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(Tool::definition)
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value, ctx: ToolContext) -> Result<ToolOutcome> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(args, ctx).await
    }
}
