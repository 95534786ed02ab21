//! Conversation message types and the id-merge reducer
//!
//! Messages are the lingua franca between agents, tools, and models. A
//! [`Message`] is a tagged variant of `{System, Human, Ai, Tool}` carrying
//! optional tool calls, a tool-call id for `Tool` responses, and an
//! `additional_kwargs` map for metadata the orchestrator threads through
//! (hidden flags, summary markers, source issue ids).
//!
//! # Merging with `add_messages`
//!
//! State channels holding message lists merge updates with [`add_messages`]:
//!
//! - a message whose id matches an existing one **replaces** it in place
//! - a [`RemoveMessage`] entry **deletes** the matching id
//! - everything else is **appended** in order
//!
//! ```rust
//! use graph_core::messages::{add_messages, Message};
//!
//! let history = vec![
//!     Message::human("Fix the typo").with_id("m1"),
//!     Message::ai("On it").with_id("m2"),
//! ];
//! let update = vec![
//!     Message::ai("On it - starting now").with_id("m2"),
//!     Message::tool("done", "call-1").with_id("m3"),
//! ];
//!
//! let merged = add_messages(history, update);
//! assert_eq!(merged.len(), 3);
//! assert_eq!(merged[1].text(), "On it - starting now");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Human,
    Ai,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back by the Tool response
    pub id: String,

    /// Registered tool name
    pub name: String,

    /// Arguments as a JSON object
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A single conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Stable id used by the id-merge reducer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub role: MessageRole,

    pub content: String,

    /// Tool calls requested by an `Ai` message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// For `Tool` messages: the call this message responds to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Free-form metadata (hidden flag, summary marker, source issue id, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_kwargs: Map<String, Value>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            additional_kwargs: Map::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Ai, content)
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional_kwargs.insert(key.into(), value);
        self
    }

    /// Message text content
    pub fn text(&self) -> &str {
        &self.content
    }

    pub fn is_ai(&self) -> bool {
        self.role == MessageRole::Ai
    }

    pub fn is_human(&self) -> bool {
        self.role == MessageRole::Human
    }

    /// Tool calls on this message, empty when none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// Whether a boolean kwarg is set to true
    pub fn kwarg_flag(&self, key: &str) -> bool {
        self.additional_kwargs
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Assign a fresh id when none is present
    pub fn ensure_id(&mut self) {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
    }
}

/// Sentinel entry deleting a message by id when merged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveMessage {
    pub id: String,
}

impl RemoveMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Serialized form recognized by [`add_messages`]
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "__remove__": self.id })
    }
}

fn remove_id(value: &Value) -> Option<&str> {
    value.get("__remove__").and_then(Value::as_str)
}

/// Merge two message lists with replace-by-id, delete, and append semantics
pub fn add_messages(left: Vec<Message>, right: Vec<Message>) -> Vec<Message> {
    let left_values = left
        .into_iter()
        .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
        .collect();
    let right_values = right
        .into_iter()
        .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
        .collect();
    add_message_values(left_values, right_values)
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

/// Value-level form of [`add_messages`], used as a channel reducer
///
/// `RemoveMessage` entries arrive as `{"__remove__": "<id>"}` objects.
pub fn add_message_values(left: Vec<Value>, right: Vec<Value>) -> Vec<Value> {
    let mut merged = left;
    for incoming in right {
        if let Some(id) = remove_id(&incoming) {
            merged.retain(|m| m.get("id").and_then(Value::as_str) != Some(id));
            continue;
        }

        let incoming_id = incoming.get("id").and_then(Value::as_str).map(str::to_owned);
        match incoming_id.and_then(|id| {
            merged
                .iter()
                .position(|m| m.get("id").and_then(Value::as_str) == Some(id.as_str()))
        }) {
            Some(position) => merged[position] = incoming,
            None => merged.push(incoming),
        }
    }
    merged
}

/// Messages with the given role, in order
pub fn filter_by_role(messages: &[Message], role: MessageRole) -> Vec<&Message> {
    messages.iter().filter(|m| m.role == role).collect()
}

/// Last message in the list, if any
pub fn get_last_message(messages: &[Message]) -> Option<&Message> {
    messages.last()
}

/// Last `Ai` message in the list, if any
pub fn last_ai_message(messages: &[Message]) -> Option<&Message> {
    messages.iter().rev().find(|m| m.is_ai())
}

/// Deserialize a message-list channel value
pub fn messages_from_value(value: Option<&Value>) -> Vec<Message> {
    value
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}
