//! Chat response and usage accounting

use crate::messages::Message;
use serde::{Deserialize, Serialize};

/// Token usage reported by a provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A complete model response
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The assistant message, including any requested tool calls
    pub message: Message,

    pub usage: TokenUsage,

    /// Key of the model that actually answered (after fallback routing)
    pub model_key: String,
}

impl ChatResponse {
    pub fn new(message: Message, usage: TokenUsage, model_key: impl Into<String>) -> Self {
        Self {
            message,
            usage,
            model_key: model_key.into(),
        }
    }
}
