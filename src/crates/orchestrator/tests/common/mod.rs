//! Shared fixtures for scenario tests

use async_trait::async_trait;
use graph_core::{ChatModel, ChatRequest, ChatResponse, Message, TokenUsage, ToolCall};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Initialize tracing once for the whole test binary.
pub fn init_logging() {
    tooling::init_logging("warn");
}

/// Scriptable chat model for driving the agent graphs in tests.
///
/// Structured calls (forced tool choice) are answered from per-tool queues;
/// the last queued value is sticky. Tool-bound free-form turns pop from the
/// `turns` queue, falling back to a plain text answer with no tool calls.
pub struct ScenarioModel {
    structured: Mutex<HashMap<String, VecDeque<Value>>>,
    turns: Mutex<VecDeque<Message>>,
    default_text: String,
}

impl ScenarioModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            structured: Mutex::new(HashMap::new()),
            turns: Mutex::new(VecDeque::new()),
            default_text: "Understood.".to_string(),
        })
    }

    /// Queue the args returned for a structured call of `tool`.
    pub fn on_structured(&self, tool: &str, args: Value) {
        self.structured
            .lock()
            .entry(tool.to_string())
            .or_default()
            .push_back(args);
    }

    /// Queue the next free-form assistant turn.
    pub fn push_turn(&self, message: Message) {
        self.turns.lock().push_back(message);
    }
}

#[async_trait]
impl ChatModel for ScenarioModel {
    async fn chat(&self, request: ChatRequest) -> graph_core::Result<ChatResponse> {
        let message = if let Some(tool) = &request.config.tool_choice {
            let mut structured = self.structured.lock();
            let queue = structured.entry(tool.clone()).or_default();
            let args = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
            .ok_or_else(|| {
                graph_core::GraphError::Model(format!("no scripted output for tool '{tool}'"))
            })?;
            Message::ai("").with_tool_calls(vec![ToolCall::new(tool.clone(), args)])
        } else {
            self.turns
                .lock()
                .pop_front()
                .unwrap_or_else(|| Message::ai(self.default_text.clone()))
        };

        Ok(ChatResponse::new(
            message,
            TokenUsage::new(50, 10),
            "scenario",
        ))
    }

    fn model_key(&self) -> &str {
        "scenario"
    }
}

/// Chat model that always fails, for exhaustion scenarios.
pub struct FailingModel {
    key: String,
}

impl FailingModel {
    pub fn new(key: &str) -> Arc<Self> {
        Arc::new(Self { key: key.into() })
    }
}

#[async_trait]
impl ChatModel for FailingModel {
    async fn chat(&self, _request: ChatRequest) -> graph_core::Result<ChatResponse> {
        Err(graph_core::GraphError::Model(format!(
            "{} is unavailable",
            self.key
        )))
    }

    fn model_key(&self) -> &str {
        &self.key
    }
}
