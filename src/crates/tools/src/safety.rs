//! Command-safety evaluation for local mode
//!
//! Before any command-executing tool runs on the local machine, the command
//! is judged by a structured model call returning `{is_safe, reasoning,
//! risk_level}`. The policy fails closed: an evaluator failure or an unsafe
//! verdict removes the call from the AI message while the remaining calls
//! proceed. A pre-defined allow-list of pure-read commands short-circuits
//! evaluation.

use llm::{structured_call, ModelRouter, StructuredSpec, TaskClass};
use graph_core::{Message, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Commands that never need evaluation when invoked without shell
/// metacharacters
pub const READ_ONLY_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "find", "stat", "pwd", "echo", "which", "wc", "file",
    "du", "df", "env", "whoami", "date", "uname", "rg", "tree",
];

/// Tools whose arguments contain an executable command
pub const COMMAND_TOOLS: &[&str] = &["shell", "install_dependencies"];

const SHELL_METACHARACTERS: &[char] = &['|', '&', ';', '>', '<', '`', '$', '(', ')', '\n'];

/// Risk classification returned by the evaluator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Structured verdict for one command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    pub reasoning: String,
    pub risk_level: RiskLevel,
}

impl SafetyVerdict {
    fn allow(reasoning: impl Into<String>) -> Self {
        Self {
            is_safe: true,
            reasoning: reasoning.into(),
            risk_level: RiskLevel::Low,
        }
    }

    fn block(reasoning: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reasoning: reasoning.into(),
            risk_level: RiskLevel::High,
        }
    }
}

fn verdict_spec() -> StructuredSpec {
    StructuredSpec::new(
        "command_safety",
        json!({
            "type": "object",
            "properties": {
                "is_safe": { "type": "boolean" },
                "reasoning": { "type": "string" },
                "risk_level": { "type": "string", "enum": ["low", "medium", "high"] }
            },
            "required": ["is_safe", "reasoning", "risk_level"]
        }),
    )
}

const EVALUATOR_PROMPT: &str = "You judge whether a shell command is safe to run on a \
developer workstation. Unsafe commands destroy data outside the working directory, \
exfiltrate secrets, alter system configuration, or download and execute untrusted code. \
Ordinary build, test, file, and package-manager commands inside the project are safe.";

/// Extract the command argv from a command-tool call.
fn command_of(call: &ToolCall) -> Vec<String> {
    match call.args.get("command") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(line)) => vec![line.clone()],
        _ => Vec::new(),
    }
}

/// Whether the command is a bare read-only invocation.
fn allow_listed(command: &[String]) -> bool {
    let Some(first) = command.first() else {
        return false;
    };
    if !READ_ONLY_COMMANDS.contains(&first.as_str()) {
        return false;
    }
    command
        .iter()
        .all(|arg| !arg.contains(SHELL_METACHARACTERS))
}

/// Fail-closed safety gate over proposed tool calls
pub struct SafetyEvaluator {
    router: Arc<ModelRouter>,
}

impl SafetyEvaluator {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    /// Judge one command. Evaluator failures block the command.
    pub async fn evaluate(&self, command: &[String]) -> SafetyVerdict {
        if allow_listed(command) {
            return SafetyVerdict::allow("read-only command on the allow-list");
        }

        let rendered = command.join(" ");
        let messages = vec![
            Message::system(EVALUATOR_PROMPT),
            Message::human(format!("Command to evaluate:\n```\n{rendered}\n```")),
        ];

        match structured_call(&self.router, TaskClass::Router, messages, &verdict_spec()).await {
            Ok(value) => match serde_json::from_value::<SafetyVerdict>(value) {
                Ok(verdict) => verdict,
                Err(e) => SafetyVerdict::block(format!("unparseable evaluator output: {e}")),
            },
            Err(e) => SafetyVerdict::block(format!("evaluator failure: {e}")),
        }
    }

    /// Filter unsafe command calls out of an AI message (local mode).
    ///
    /// Returns the edited message plus the blocked calls with their
    /// verdicts. Non-command tools and safe commands pass through; the
    /// remaining calls keep their original order.
    pub async fn filter_unsafe_calls(
        &self,
        message: &Message,
    ) -> (Message, Vec<(ToolCall, SafetyVerdict)>) {
        let mut kept = Vec::new();
        let mut blocked = Vec::new();

        for call in message.tool_calls() {
            if !COMMAND_TOOLS.contains(&call.name.as_str()) {
                kept.push(call.clone());
                continue;
            }

            let command = command_of(call);
            let verdict = self.evaluate(&command).await;
            if verdict.is_safe {
                kept.push(call.clone());
            } else {
                warn!(
                    tool = %call.name,
                    command = %command.join(" "),
                    reasoning = %verdict.reasoning,
                    "blocked unsafe command"
                );
                blocked.push((call.clone(), verdict));
            }
        }

        let mut edited = message.clone();
        if !blocked.is_empty() {
            info!(blocked = blocked.len(), "removed blocked tool calls from message");
            let names: Vec<&str> = blocked.iter().map(|(c, _)| c.name.as_str()).collect();
            edited.content = format!(
                "{}\n\n[{} blocked by the command safety policy]",
                edited.content,
                names.join(", ")
            );
        }
        edited.tool_calls = if kept.is_empty() { None } else { Some(kept) };

        (edited, blocked)
    }
}
