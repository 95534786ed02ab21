//! File viewing and editing tools

use crate::error::ToolError;
use crate::registry::{Tool, ToolContext, ToolOutcome};
use sandbox::ExecRequest;
use serde_json::{json, Value};

/// Cap on rendered file content, in lines
const MAX_VIEW_LINES: usize = 2000;

const DEFAULT_TSCONFIG: &str = r#"{
  "compilerOptions": {
    "target": "ES2022",
    "module": "NodeNext",
    "moduleResolution": "NodeNext",
    "strict": true,
    "esModuleInterop": true,
    "skipLibCheck": true,
    "outDir": "dist"
  },
  "include": ["src"]
}
"#;

fn render_numbered(content: &str, range: Option<(usize, usize)>) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = match range {
        Some((start, end)) => (start.max(1), end.min(lines.len())),
        None => (1, lines.len()),
    };
    let span = end.saturating_sub(start.saturating_sub(1));

    let mut out = String::new();
    for (index, line) in lines
        .iter()
        .enumerate()
        .skip(start.saturating_sub(1))
        .take(span.min(MAX_VIEW_LINES))
    {
        out.push_str(&format!("{:>6}\t{line}\n", index + 1));
    }
    if span > MAX_VIEW_LINES {
        out.push_str("... (truncated)\n");
    }
    out
}

fn view_range(args: &Value) -> Option<(usize, usize)> {
    let range = args.get("view_range")?.as_array()?;
    let start = range.first()?.as_u64()? as usize;
    let end = range.get(1)?.as_u64()? as usize;
    Some((start, end))
}

fn require_str<'a>(tool: &str, args: &'a Value, key: &str) -> crate::error::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_args(tool, format!("missing '{key}'")))
}

/// `view` - read a file with line numbers
pub fn view_tool() -> Tool {
    Tool::new(
        "view",
        "View a file's contents with line numbers, optionally restricted to a line range.",
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "view_range": {
                    "type": "array",
                    "items": { "type": "number" },
                    "description": "[start_line, end_line], 1-indexed inclusive"
                }
            },
            "required": ["path"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let path = require_str("view", &args, "path")?;
                let content = ctx.backend.read_file(path).await?;
                Ok(ToolOutcome::success(render_numbered(
                    &content,
                    view_range(&args),
                )))
            })
        },
    )
}

/// `str_replace_based_edit_tool` - view/create/str_replace/insert
pub fn str_replace_edit_tool() -> Tool {
    Tool::new(
        "str_replace_based_edit_tool",
        "File editor. Commands: 'view' a file, 'create' a file with file_text, \
         'str_replace' a unique occurrence of old_str with new_str, or 'insert' new_str after insert_line.",
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "enum": ["view", "create", "str_replace", "insert"] },
                "path": { "type": "string" },
                "file_text": { "type": "string" },
                "old_str": { "type": "string" },
                "new_str": { "type": "string" },
                "insert_line": { "type": "number" },
                "view_range": { "type": "array", "items": { "type": "number" } }
            },
            "required": ["command", "path"]
        }),
        |args, ctx| {
            Box::pin(async move {
                const TOOL: &str = "str_replace_based_edit_tool";
                let command = require_str(TOOL, &args, "command")?;
                let path = require_str(TOOL, &args, "path")?;

                match command {
                    "view" => {
                        let content = ctx.backend.read_file(path).await?;
                        Ok(ToolOutcome::success(render_numbered(
                            &content,
                            view_range(&args),
                        )))
                    }
                    "create" => {
                        let text = require_str(TOOL, &args, "file_text")?;
                        ctx.backend.write_file(path, text).await?;
                        Ok(ToolOutcome::success(format!("Created {path}")))
                    }
                    "str_replace" => {
                        let old = require_str(TOOL, &args, "old_str")?;
                        let new = args.get("new_str").and_then(Value::as_str).unwrap_or("");
                        let content = ctx.backend.read_file(path).await?;

                        let occurrences = content.matches(old).count();
                        if occurrences == 0 {
                            return Ok(ToolOutcome::error(format!(
                                "old_str not found in {path}"
                            )));
                        }
                        if occurrences > 1 {
                            return Ok(ToolOutcome::error(format!(
                                "old_str occurs {occurrences} times in {path}; it must be unique"
                            )));
                        }

                        let updated = content.replacen(old, new, 1);
                        ctx.backend.write_file(path, &updated).await?;
                        Ok(ToolOutcome::success(format!("Edited {path}")))
                    }
                    "insert" => {
                        let new = require_str(TOOL, &args, "new_str")?;
                        let line = args
                            .get("insert_line")
                            .and_then(Value::as_u64)
                            .ok_or_else(|| {
                                ToolError::invalid_args(TOOL, "missing 'insert_line'")
                            })? as usize;

                        let content = ctx.backend.read_file(path).await?;
                        let mut lines: Vec<&str> = content.lines().collect();
                        let position = line.min(lines.len());
                        lines.insert(position, new);
                        let mut updated = lines.join("\n");
                        if content.ends_with('\n') {
                            updated.push('\n');
                        }
                        ctx.backend.write_file(path, &updated).await?;
                        Ok(ToolOutcome::success(format!(
                            "Inserted after line {position} in {path}"
                        )))
                    }
                    other => Ok(ToolOutcome::error(format!("unknown command '{other}'"))),
                }
            })
        },
    )
}

/// `apply_patch` - apply a unified diff via `git apply`
pub fn apply_patch_tool() -> Tool {
    Tool::new(
        "apply_patch",
        "Apply a unified diff to the repository with `git apply`. Prefer str_replace_based_edit_tool for small edits.",
        json!({
            "type": "object",
            "properties": {
                "patch": { "type": "string", "description": "Unified diff content" },
                "cwd": { "type": "string" }
            },
            "required": ["patch"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let patch = require_str("apply_patch", &args, "patch")?;
                let cwd = args
                    .get("cwd")
                    .and_then(Value::as_str)
                    .map(|d| ctx.backend.resolve_path(d))
                    .unwrap_or_else(|| ctx.backend.workdir().to_string());

                let patch_path = format!("{cwd}/.pending.patch");
                ctx.backend.write_file(&patch_path, patch).await?;

                let output = ctx
                    .backend
                    .run(
                        ExecRequest::new(["git", "apply", "--whitespace=fix", ".pending.patch"])
                            .in_dir(&cwd),
                    )
                    .await?;
                let _ = ctx
                    .backend
                    .run(ExecRequest::new(["rm", "-f", ".pending.patch"]).in_dir(&cwd))
                    .await;

                if output.is_success() {
                    Ok(ToolOutcome::success("Patch applied"))
                } else {
                    Ok(ToolOutcome::error(format!(
                        "git apply failed: {}",
                        output.stderr.trim()
                    )))
                }
            })
        },
    )
}

/// `write_default_tsconfig` - seed a tsconfig.json when a TS repo lacks one
pub fn write_default_tsconfig_tool() -> Tool {
    Tool::new(
        "write_default_tsconfig",
        "Write a default tsconfig.json when the repository does not have one.",
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Target path (default tsconfig.json)" }
            }
        }),
        |args, ctx| {
            Box::pin(async move {
                let path = args
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or("tsconfig.json");

                if ctx.backend.file_exists(path).await {
                    return Ok(ToolOutcome::success(format!("{path} already exists")));
                }
                ctx.backend.write_file(path, DEFAULT_TSCONFIG).await?;
                Ok(ToolOutcome::success(format!("Wrote default {path}")))
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExecBackend;
    use graph_core::StateMap;

    fn ctx_in(dir: &tempfile::TempDir) -> ToolContext {
        ToolContext::new(
            StateMap::new(),
            ExecBackend::local(dir.path().to_string_lossy()),
        )
    }

    #[tokio::test]
    async fn view_numbers_lines_and_honors_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "alpha\nbeta\ngamma\n").unwrap();

        let outcome = view_tool()
            .execute(json!({"path": "f.txt", "view_range": [2, 3]}), ctx_in(&dir))
            .await
            .unwrap();
        assert!(outcome.result.contains("2\tbeta"));
        assert!(outcome.result.contains("3\tgamma"));
        assert!(!outcome.result.contains("alpha"));
    }

    #[tokio::test]
    async fn create_then_str_replace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = str_replace_edit_tool();

        tool.execute(
            json!({"command": "create", "path": "src/lib.rs", "file_text": "fn main() { old() }"}),
            ctx_in(&dir),
        )
        .await
        .unwrap();

        let outcome = tool
            .execute(
                json!({"command": "str_replace", "path": "src/lib.rs", "old_str": "old()", "new_str": "new()"}),
                ctx_in(&dir),
            )
            .await
            .unwrap();
        assert!(!outcome.is_error());

        let content = std::fs::read_to_string(dir.path().join("src/lib.rs")).unwrap();
        assert_eq!(content, "fn main() { new() }");
    }

    #[tokio::test]
    async fn ambiguous_str_replace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "dup dup").unwrap();

        let outcome = str_replace_edit_tool()
            .execute(
                json!({"command": "str_replace", "path": "f.txt", "old_str": "dup", "new_str": "x"}),
                ctx_in(&dir),
            )
            .await
            .unwrap();
        assert!(outcome.is_error());
        assert!(outcome.result.contains("must be unique"));
    }

    #[tokio::test]
    async fn insert_places_line_after_position() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one\nthree\n").unwrap();

        str_replace_edit_tool()
            .execute(
                json!({"command": "insert", "path": "f.txt", "insert_line": 1, "new_str": "two"}),
                ctx_in(&dir),
            )
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn tsconfig_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tsconfig.json"), "{}").unwrap();

        let outcome = write_default_tsconfig_tool()
            .execute(json!({}), ctx_in(&dir))
            .await
            .unwrap();
        assert!(outcome.result.contains("already exists"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tsconfig.json")).unwrap(),
            "{}"
        );
    }
}
