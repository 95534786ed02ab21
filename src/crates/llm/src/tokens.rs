//! Token counting for context window management
//!
//! Character-based approximation of token counts, tuned per model family.
//! Exact tokenizer parity is not required: the counts gate summarization
//! thresholds, not billing.

use graph_core::Message;

/// Token count result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenCount {
    pub tokens: usize,
    pub chars: usize,
}

impl TokenCount {
    pub fn new(tokens: usize, chars: usize) -> Self {
        Self { tokens, chars }
    }

    pub fn add(&mut self, other: TokenCount) {
        self.tokens += other.tokens;
        self.chars += other.chars;
    }
}

/// Approximate token counter for a model family
pub struct TokenCounter {
    tokens_per_char: f32,
}

impl TokenCounter {
    pub fn new(model: impl AsRef<str>) -> Self {
        Self {
            tokens_per_char: Self::tokens_per_char(model.as_ref()),
        }
    }

    fn tokens_per_char(model: &str) -> f32 {
        // Approximations for common families (roughly 4 chars per token).
        if model.contains("gpt") || model.contains("openai") {
            0.25
        } else if model.contains("claude") || model.contains("anthropic") {
            0.27
        } else if model.contains("llama") {
            0.23
        } else {
            0.25
        }
    }

    pub fn count_text(&self, text: &str) -> TokenCount {
        let chars = text.chars().count();
        TokenCount::new((chars as f32 * self.tokens_per_char).ceil() as usize, chars)
    }

    /// Count one message: content plus serialized tool calls.
    pub fn count_message(&self, message: &Message) -> TokenCount {
        let mut count = self.count_text(&message.content);
        for call in message.tool_calls() {
            count.add(self.count_text(&call.name));
            count.add(self.count_text(&call.args.to_string()));
        }
        count
    }

    pub fn count_messages(&self, messages: &[Message]) -> TokenCount {
        let mut total = TokenCount::default();
        for message in messages {
            total.add(self.count_message(message));
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_core::ToolCall;
    use serde_json::json;

    #[test]
    fn counts_scale_with_length() {
        let counter = TokenCounter::new("claude-sonnet");
        let short = counter.count_text("hello");
        let long = counter.count_text(&"hello ".repeat(100));
        assert!(long.tokens > short.tokens * 50);
    }

    #[test]
    fn tool_calls_contribute_tokens() {
        let counter = TokenCounter::new("gpt-4o");
        let plain = Message::ai("running a command");
        let with_call = Message::ai("running a command").with_tool_calls(vec![ToolCall::new(
            "shell",
            json!({"command": ["cargo", "check"], "cwd": "/work"}),
        )]);

        assert!(counter.count_message(&with_call).tokens > counter.count_message(&plain).tokens);
    }

    #[test]
    fn empty_text_is_zero() {
        let counter = TokenCounter::new("other");
        assert_eq!(counter.count_text("").tokens, 0);
    }
}
