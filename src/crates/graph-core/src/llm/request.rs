//! Chat request and generation configuration

use crate::llm::tools::ToolDefinition;
use crate::messages::Message;

/// A request to a chat model: messages plus generation configuration
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub config: ChatConfig,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: ChatConfig::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    /// Bind tools the model may call.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.config.tools = tools;
        self
    }

    /// Force the model to call the named tool.
    pub fn with_tool_choice(mut self, tool: impl Into<String>) -> Self {
        self.config.tool_choice = Some(tool.into());
        self
    }

    /// Allow or forbid multiple tool calls in one turn. Some models reject
    /// the parameter entirely; the router clears it for those.
    pub fn with_parallel_tool_calls(mut self, allowed: bool) -> Self {
        self.config.parallel_tool_calls = Some(allowed);
        self
    }
}

/// Generation parameters attached to a [`ChatRequest`]
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<String>,
    pub parallel_tool_calls: Option<bool>,
}

impl ChatConfig {
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}
