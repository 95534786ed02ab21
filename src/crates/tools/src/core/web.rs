//! URL fetching with the per-thread document cache

use crate::core::search::cached_document;
use crate::error::ToolError;
use crate::registry::{Tool, ToolContext, ToolOutcome};
use graph_core::StateMap;
use serde_json::{json, Value};

/// Cap on cached document size in characters
const MAX_DOCUMENT_CHARS: usize = 50_000;

/// Crude tag stripper for HTML responses; plain text passes through.
pub fn html_to_text(body: &str) -> String {
    if !body.contains('<') {
        return body.to_string();
    }

    let mut out = String::with_capacity(body.len() / 2);
    let mut in_tag = false;
    let mut in_script = false;
    let lower = body.to_lowercase();

    let mut index = 0;
    for ch in body.chars() {
        // Lowercasing can shift byte offsets for non-ASCII text; fall back
        // to an empty lookahead rather than slicing off a char boundary.
        let rest = lower.get(index..).unwrap_or("");
        if rest.starts_with("<script") || rest.starts_with("<style") {
            in_script = true;
        }
        if in_script && (rest.starts_with("</script") || rest.starts_with("</style")) {
            in_script = false;
        }
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag && !in_script => out.push(c),
            _ => {}
        }
        index += ch.len_utf8();
    }

    // Collapse blank-line runs left behind by removed markup.
    let mut text = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        text.push_str(trimmed);
        text.push('\n');
    }
    text
}

/// `get_url_content` - fetch a URL as text, caching per thread
pub fn get_url_content_tool() -> Tool {
    Tool::new(
        "get_url_content",
        "Fetch the content of a URL as text. Results are cached for this conversation; \
         use search_document_for to search within a fetched document.",
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" }
            },
            "required": ["url"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let url = args
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::invalid_args("get_url_content", "missing 'url'"))?
                    .to_string();

                if let Some(cached) = cached_document(&ctx, &url) {
                    return Ok(ToolOutcome::success(cached));
                }

                let response = ctx.http.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Ok(ToolOutcome::error(format!(
                        "GET {url} returned {status}"
                    )));
                }

                let body = response.text().await?;
                let mut text = html_to_text(&body);
                if text.chars().count() > MAX_DOCUMENT_CHARS {
                    text = text.chars().take(MAX_DOCUMENT_CHARS).collect();
                    text.push_str("\n... (truncated)");
                }

                // The document cache merges per URL; concurrent fetches of
                // different URLs union cleanly.
                let mut updates = StateMap::new();
                updates.insert("document_cache".into(), json!({ url: text.clone() }));
                Ok(ToolOutcome::success(text).with_state_updates(updates))
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExecBackend;

    #[test]
    fn html_is_stripped_to_text() {
        let html = "<html><head><style>body { color: red }</style></head>\
                    <body><h1>Title</h1><p>First paragraph.</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("First paragraph."));
        assert!(!text.contains("color: red"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("no markup here"), "no markup here");
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        let mut state = StateMap::new();
        state.insert(
            "document_cache".into(),
            json!({"https://cached.example": "cached body"}),
        );
        let ctx = ToolContext::new(state, ExecBackend::local("/tmp"));

        let outcome = get_url_content_tool()
            .execute(json!({"url": "https://cached.example"}), ctx)
            .await
            .unwrap();
        assert_eq!(outcome.result, "cached body");
        assert!(outcome.state_updates.is_none());
    }
}
