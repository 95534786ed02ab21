//! Shell and dependency-installation tools

use crate::registry::{Tool, ToolContext, ToolOutcome};
use crate::error::ToolError;
use graph_core::StateMap;
use sandbox::ExecRequest;
use serde_json::{json, Value};
use std::time::Duration;

fn command_from_args(tool: &str, args: &Value) -> crate::error::Result<Vec<String>> {
    match args.get("command") {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(Value::String(line)) => Ok(vec![line.clone()]),
        _ => Err(ToolError::invalid_args(tool, "missing 'command'")),
    }
}

fn format_output(output: &sandbox::ExecOutput) -> String {
    let mut rendered = format!("exit code: {}", output.exit_code);
    if !output.stdout.is_empty() {
        rendered.push_str(&format!("\nstdout:\n{}", output.stdout));
    }
    if !output.stderr.is_empty() {
        rendered.push_str(&format!("\nstderr:\n{}", output.stderr));
    }
    rendered
}

async fn run_command(
    tool: &str,
    args: &Value,
    ctx: &ToolContext,
) -> crate::error::Result<(sandbox::ExecOutput, String)> {
    let command = command_from_args(tool, args)?;
    if command.is_empty() {
        return Err(ToolError::invalid_args(tool, "empty 'command'"));
    }

    let timeout = args
        .get("timeout_secs")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or(ctx.timeout);

    let mut request = ExecRequest::new(command).with_timeout(timeout);
    if let Some(cwd) = args.get("cwd").and_then(Value::as_str) {
        request = request.in_dir(ctx.backend.resolve_path(cwd));
    }

    let output = ctx.backend.run(request).await?;
    let rendered = format_output(&output);
    Ok((output, rendered))
}

/// `shell` - run a command in the workspace
pub fn shell_tool() -> Tool {
    Tool::new(
        "shell",
        "Run a shell command in the repository workspace. Returns the exit code and captured output.",
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Command and arguments to execute"
                },
                "cwd": { "type": "string", "description": "Working directory (defaults to the repository root)" },
                "timeout_secs": { "type": "number", "description": "Timeout in seconds (default 30)" }
            },
            "required": ["command"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let (output, rendered) = run_command("shell", &args, &ctx).await?;
                if output.is_success() {
                    Ok(ToolOutcome::success(rendered))
                } else {
                    Ok(ToolOutcome::error(rendered))
                }
            })
        },
    )
}

/// `install_dependencies` - run the project's dependency installation
pub fn install_dependencies_tool() -> Tool {
    Tool::new(
        "install_dependencies",
        "Install the repository's dependencies with the given command. Only call when a build or test fails for missing dependencies.",
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Installation command, e.g. [\"npm\", \"install\"]"
                },
                "cwd": { "type": "string" }
            },
            "required": ["command"]
        }),
        |args, ctx| {
            Box::pin(async move {
                let (output, rendered) = run_command("install_dependencies", &args, &ctx).await?;
                if output.is_success() {
                    let mut updates = StateMap::new();
                    updates.insert("dependencies_installed".into(), json!(true));
                    Ok(ToolOutcome::success(rendered).with_state_updates(updates))
                } else {
                    Ok(ToolOutcome::error(rendered))
                }
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExecBackend;

    fn ctx() -> ToolContext {
        ToolContext::new(StateMap::new(), ExecBackend::local("/tmp"))
    }

    #[tokio::test]
    async fn shell_returns_output_and_exit_code() {
        let outcome = shell_tool()
            .execute(json!({"command": ["echo", "hi there"]}), ctx())
            .await
            .unwrap();
        assert!(!outcome.is_error());
        assert!(outcome.result.contains("exit code: 0"));
        assert!(outcome.result.contains("hi there"));
    }

    #[tokio::test]
    async fn failing_command_is_an_error_outcome() {
        let outcome = shell_tool()
            .execute(json!({"command": ["false"]}), ctx())
            .await
            .unwrap();
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn missing_command_is_invalid_args() {
        let err = shell_tool().execute(json!({}), ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs { .. }));
    }

    #[tokio::test]
    async fn install_marks_dependencies_installed() {
        let outcome = install_dependencies_tool()
            .execute(json!({"command": ["true"]}), ctx())
            .await
            .unwrap();
        assert!(!outcome.is_error());
        let updates = outcome.state_updates.unwrap();
        assert_eq!(updates["dependencies_installed"], json!(true));
    }
}
