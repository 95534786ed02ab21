//! The take-action loop: executing a message's tool calls
//!
//! [`ToolRunner`] turns the tool calls on an AI message into executed side
//! effects. Calls run sequentially (edits must not race), each under the
//! per-call timeout. Failures become error Tool messages so the model can
//! recover on its own; they never abort the loop.

use crate::error::ToolError;
use crate::registry::{ToolContext, ToolOutcome, ToolRegistry, ToolStatus};
use graph_core::{Message, StateMap, ToolCall};
use std::sync::Arc;
use std::time::Duration;
use tooling::{with_timeout, TimeoutError};
use tracing::{debug, warn};

/// Default per-call timeout
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of executing one message's worth of tool calls
#[derive(Debug, Default)]
pub struct ToolRunResult {
    /// One Tool message per executed call, in call order
    pub messages: Vec<Message>,

    /// Union of the state updates the tools produced (later tools win per
    /// field; message-like fields merge through the schema's reducers when
    /// the node returns this update)
    pub state_updates: StateMap,

    /// Names of calls that ended in error, for routing decisions
    pub failed_calls: Vec<String>,
}

impl ToolRunResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed_calls.is_empty()
    }
}

/// Executes tool calls against a registry
#[derive(Clone)]
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute every tool call on the message, in order.
    pub async fn execute_calls(&self, calls: &[ToolCall], ctx: &ToolContext) -> ToolRunResult {
        let mut result = ToolRunResult::default();

        for call in calls {
            let outcome = self.execute_one(call, ctx).await;

            if outcome.is_error() {
                result.failed_calls.push(call.name.clone());
            }
            if let Some(updates) = &outcome.state_updates {
                for (key, value) in updates {
                    result.state_updates.insert(key.clone(), value.clone());
                }
            }

            let content = match outcome.status {
                ToolStatus::Success => outcome.result,
                ToolStatus::Error => format!("Error: {}", outcome.result),
            };
            result
                .messages
                .push(Message::tool(content, call.id.clone()));
        }

        result
    }

    async fn execute_one(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        debug!(tool = %call.name, "executing tool call");
        let ctx = ctx.clone().with_timeout(self.timeout);

        let execution = self
            .registry
            .execute(&call.name, call.args.clone(), ctx);

        match with_timeout(self.timeout, execution).await {
            Ok(outcome) => outcome,
            Err(TimeoutError::Timeout(duration)) => {
                warn!(tool = %call.name, timeout = ?duration, "tool call timed out");
                ToolOutcome::error(
                    ToolError::Timeout {
                        tool: call.name.clone(),
                        seconds: duration.as_secs(),
                    }
                    .to_string(),
                )
            }
            Err(TimeoutError::OperationFailed(e)) => {
                warn!(tool = %call.name, error = %e, "tool call failed");
                ToolOutcome::error(e.to_string())
            }
        }
    }
}
