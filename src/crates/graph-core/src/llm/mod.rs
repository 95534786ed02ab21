//! Provider-agnostic chat model interface
//!
//! The runtime is an orchestration engine, not an LLM client library. This
//! module defines the narrow seam the agents consume: a [`ChatModel`] trait
//! with a single `chat` call over [`Message`](crate::messages::Message)
//! lists, tool definitions, and token usage. Provider SDKs implement the
//! trait outside this workspace; tests use in-memory fakes.

pub mod request;
pub mod response;
pub mod tools;
pub mod traits;

pub use request::{ChatConfig, ChatRequest};
pub use response::{ChatResponse, TokenUsage};
pub use tools::ToolDefinition;
pub use traits::ChatModel;
