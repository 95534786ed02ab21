//! Internal-message token management and history summarization
//!
//! The model-facing conversation grows without bound during long tool
//! loops. When the token count of messages since the last summary (always
//! excluding the most recent [`SUMMARY_TAIL_EXCLUDED`] messages) reaches
//! the configured ceiling, the window is compacted into a single hidden
//! summary message and the summarized messages are deleted from the
//! channel.

use crate::error::Result;
use crate::state::kwargs;
use graph_core::{Message, RemoveMessage};
use llm::{ModelRouter, TaskClass, TokenCounter};
use serde_json::{json, Value};
use tracing::info;

/// Recent messages never included in a summarization window
pub const SUMMARY_TAIL_EXCLUDED: usize = 20;

const SUMMARIZER_PROMPT: &str = "Condense the following agent conversation into a factual \
summary of what was attempted, what happened, and what remains. Preserve file paths, error \
messages, and decisions. Do not include full source files or code blocks.";

/// Index of the first message after the last summary marker.
fn window_start(messages: &[Message]) -> usize {
    messages
        .iter()
        .rposition(|m| m.kwarg_flag(kwargs::SUMMARY_MESSAGE))
        .map(|index| index + 1)
        .unwrap_or(0)
}

/// The summarizable window: messages since the last summary, excluding the
/// trailing [`SUMMARY_TAIL_EXCLUDED`].
pub fn summarizable_window(messages: &[Message]) -> &[Message] {
    let start = window_start(messages);
    let window = &messages[start..];
    let keep_from = window.len().saturating_sub(SUMMARY_TAIL_EXCLUDED);
    &window[..keep_from]
}

/// Token count of the summarizable window.
pub fn tokens_since_last_summary(messages: &[Message], counter: &TokenCounter) -> usize {
    counter.count_messages(summarizable_window(messages)).tokens
}

/// Whether the window has reached the ceiling.
pub fn should_summarize(
    messages: &[Message],
    counter: &TokenCounter,
    max_internal_tokens: usize,
) -> bool {
    tokens_since_last_summary(messages, counter) >= max_internal_tokens
}

fn render_for_summary(messages: &[Message]) -> String {
    let mut rendered = String::new();
    for message in messages {
        let role = format!("{:?}", message.role).to_lowercase();
        rendered.push_str(&format!("[{role}] {}\n", message.content));
        for call in message.tool_calls() {
            rendered.push_str(&format!("  -> called {}({})\n", call.name, call.args));
        }
    }
    rendered
}

/// Compact the summarizable window into a hidden summary message.
///
/// Returns the update for the internal message channel: delete entries for
/// every summarized message followed by the summary itself. Returns `None`
/// when there is nothing to summarize.
pub async fn summarize_history(
    router: &ModelRouter,
    messages: &[Message],
) -> Result<Option<Vec<Value>>> {
    let window = summarizable_window(messages);
    if window.is_empty() {
        return Ok(None);
    }

    let request = graph_core::ChatRequest::new(vec![
        Message::system(SUMMARIZER_PROMPT),
        Message::human(render_for_summary(window)),
    ]);
    let response = router.chat(TaskClass::Summarizer, request).await?;

    let summary = Message::ai(format!(
        "Conversation summary (older context compacted):\n{}",
        response.message.content
    ))
    .with_kwarg(kwargs::SUMMARY_MESSAGE, json!(true))
    .with_kwarg(kwargs::HIDDEN, json!(true));

    info!(
        summarized = window.len(),
        "compacted internal message history"
    );

    let mut update: Vec<Value> = window
        .iter()
        .filter_map(|m| m.id.as_deref())
        .map(|id| RemoveMessage::new(id).to_value())
        .collect();
    update.push(serde_json::to_value(summary)?);
    Ok(Some(update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_with_len(id: usize, chars: usize) -> Message {
        Message::ai("x".repeat(chars)).with_id(format!("m{id}"))
    }

    #[test]
    fn window_excludes_trailing_messages() {
        let messages: Vec<Message> = (0..30).map(|i| message_with_len(i, 10)).collect();
        let window = summarizable_window(&messages);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].id.as_deref(), Some("m0"));
    }

    #[test]
    fn window_restarts_after_summary_marker() {
        let mut messages: Vec<Message> = (0..5).map(|i| message_with_len(i, 10)).collect();
        messages.push(
            Message::ai("summary")
                .with_id("s1")
                .with_kwarg(kwargs::SUMMARY_MESSAGE, json!(true)),
        );
        // 25 more after the marker: window = 25 - 20 = 5, starting after s1.
        messages.extend((100..125).map(|i| message_with_len(i, 10)));

        let window = summarizable_window(&messages);
        assert_eq!(window.len(), 5);
        assert_eq!(window[0].id.as_deref(), Some("m100"));
    }

    #[test]
    fn short_histories_do_not_summarize() {
        let messages: Vec<Message> = (0..10).map(|i| message_with_len(i, 1000)).collect();
        let counter = TokenCounter::new("claude");
        // Entire history is inside the excluded tail.
        assert_eq!(tokens_since_last_summary(&messages, &counter), 0);
        assert!(!should_summarize(&messages, &counter, 1));
    }

    #[test]
    fn ceiling_triggers_summarization_decision() {
        let messages: Vec<Message> = (0..40).map(|i| message_with_len(i, 1000)).collect();
        let counter = TokenCounter::new("claude");
        let tokens = tokens_since_last_summary(&messages, &counter);
        assert!(tokens > 0);
        assert!(should_summarize(&messages, &counter, tokens));
        assert!(!should_summarize(&messages, &counter, tokens + 1));
    }
}
