//! Repository and document search tools

use crate::error::ToolError;
use crate::registry::{Tool, ToolContext, ToolOutcome};
use sandbox::ExecRequest;
use serde_json::{json, Value};

/// Cap on returned match lines
const MAX_MATCHES: usize = 200;

/// `grep` - recursive pattern search in the repository
pub fn grep_tool() -> Tool {
    Tool::new(
        "grep",
        "Search the repository recursively for a pattern. Returns matching lines with file and line number.",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Pattern to search for" },
                "directory": { "type": "string", "description": "Directory to search (default repository root)" },
                "case_insensitive": { "type": "boolean" },
                "include": { "type": "string", "description": "Glob restricting files, e.g. *.rs" }
            },
            "required": ["query"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let query = args
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::invalid_args("grep", "missing 'query'"))?;

                let directory = args
                    .get("directory")
                    .and_then(Value::as_str)
                    .map(|d| ctx.backend.resolve_path(d))
                    .unwrap_or_else(|| ctx.backend.workdir().to_string());

                let mut command = vec![
                    "grep".to_string(),
                    "-rn".to_string(),
                    "--binary-files=without-match".to_string(),
                    "--exclude-dir=.git".to_string(),
                ];
                if args
                    .get("case_insensitive")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                {
                    command.push("-i".to_string());
                }
                if let Some(include) = args.get("include").and_then(Value::as_str) {
                    command.push(format!("--include={include}"));
                }
                command.push("-e".to_string());
                command.push(query.to_string());
                command.push(".".to_string());

                let output = ctx
                    .backend
                    .run(ExecRequest::new(command).in_dir(&directory))
                    .await?;

                // Exit code 1 means no matches, not failure.
                match output.exit_code {
                    0 => {
                        let lines: Vec<&str> =
                            output.stdout.lines().take(MAX_MATCHES).collect();
                        let mut rendered = lines.join("\n");
                        if output.stdout.lines().count() > MAX_MATCHES {
                            rendered.push_str("\n... (truncated)");
                        }
                        Ok(ToolOutcome::success(rendered))
                    }
                    1 => Ok(ToolOutcome::success("No matches found")),
                    _ => Ok(ToolOutcome::error(format!(
                        "grep failed: {}",
                        output.stderr.trim()
                    ))),
                }
            })
        },
    )
}

/// Look up a cached document, if present.
pub(crate) fn cached_document(ctx: &ToolContext, url: &str) -> Option<String> {
    ctx.state_value("document_cache")?
        .get(url)?
        .as_str()
        .map(str::to_string)
}

/// `search_document_for` - search a fetched document for a query
pub fn search_document_tool() -> Tool {
    Tool::new(
        "search_document_for",
        "Search a previously fetched document (by URL) for lines matching a query. Fetch with get_url_content first.",
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "query": { "type": "string" }
            },
            "required": ["url", "query"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let url = args
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::invalid_args("search_document_for", "missing 'url'"))?;
                let query = args
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::invalid_args("search_document_for", "missing 'query'"))?;

                let Some(content) = cached_document(&ctx, url) else {
                    return Ok(ToolOutcome::error(format!(
                        "{url} is not in the document cache; call get_url_content first"
                    )));
                };

                let needle = query.to_lowercase();
                let matches: Vec<String> = content
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| line.to_lowercase().contains(&needle))
                    .take(MAX_MATCHES)
                    .map(|(index, line)| format!("{}: {}", index + 1, line.trim()))
                    .collect();

                if matches.is_empty() {
                    Ok(ToolOutcome::success(format!("No lines match '{query}'")))
                } else {
                    Ok(ToolOutcome::success(matches.join("\n")))
                }
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExecBackend;
    use graph_core::StateMap;

    #[tokio::test]
    async fn grep_finds_matches_in_local_checkout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn alpha() {}\nfn beta() {}\n").unwrap();

        let ctx = ToolContext::new(
            StateMap::new(),
            ExecBackend::local(dir.path().to_string_lossy()),
        );
        let outcome = grep_tool()
            .execute(json!({"query": "alpha"}), ctx)
            .await
            .unwrap();
        assert!(outcome.result.contains("a.rs"));
        assert!(outcome.result.contains("alpha"));
    }

    #[tokio::test]
    async fn grep_reports_no_matches_as_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn alpha() {}\n").unwrap();

        let ctx = ToolContext::new(
            StateMap::new(),
            ExecBackend::local(dir.path().to_string_lossy()),
        );
        let outcome = grep_tool()
            .execute(json!({"query": "nothing_matches_this"}), ctx)
            .await
            .unwrap();
        assert!(!outcome.is_error());
        assert_eq!(outcome.result, "No matches found");
    }

    #[tokio::test]
    async fn document_search_reads_the_cache() {
        let mut state = StateMap::new();
        state.insert(
            "document_cache".into(),
            json!({"https://docs.example": "Install with cargo.\nRun with make.\n"}),
        );
        let ctx = ToolContext::new(state, ExecBackend::local("/tmp"));

        let outcome = search_document_tool()
            .execute(
                json!({"url": "https://docs.example", "query": "cargo"}),
                ctx,
            )
            .await
            .unwrap();
        assert!(outcome.result.contains("Install with cargo"));
    }

    #[tokio::test]
    async fn uncached_document_is_an_error() {
        let ctx = ToolContext::new(StateMap::new(), ExecBackend::local("/tmp"));
        let outcome = search_document_tool()
            .execute(json!({"url": "https://missing", "query": "x"}), ctx)
            .await
            .unwrap();
        assert!(outcome.is_error());
    }
}
