//! Core trait for chat-based language models

use crate::error::Result;
use crate::llm::request::ChatRequest;
use crate::llm::response::ChatResponse;
use async_trait::async_trait;

/// Minimal provider-agnostic chat interface
///
/// Implementations convert [`Message`](crate::messages::Message)s to their
/// provider's wire format, make the call, and convert back. Tool-calling
/// models surface requested calls via `response.message.tool_calls`.
///
/// Implementations must be `Send + Sync`; share them as
/// `Arc<dyn ChatModel>` across graph nodes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete chat response.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Model`](crate::error::GraphError::Model) for
    /// network failures, authentication errors, rate limits, and invalid
    /// requests. The fallback router in the `llm` crate treats any error
    /// from this method as grounds to try the next model in the chain.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Stable identifier for this model, used by routing and the
    /// per-model circuit breaker.
    fn model_key(&self) -> &str;
}
