//! Issue-body embedded plan formats and inter-graph handoff messages
//!
//! Task plans and proposed plans ride inside issue bodies between sentinel
//! tags, optionally wrapped in an HTML `<details>` section so they fold in
//! the UI. Parsing tolerates whitespace and arbitrary content around the
//! sentinels; serializing replaces an existing block in place.

use crate::plan::TaskPlan;
use regex::Regex;

pub const TASK_PLAN_OPEN: &str = "<open-swe-do-not-edit-task-plan>";
pub const TASK_PLAN_CLOSE: &str = "</open-swe-do-not-edit-task-plan>";
pub const PROPOSED_PLAN_OPEN: &str = "<open-swe-do-not-edit-proposed-plan>";
pub const PROPOSED_PLAN_CLOSE: &str = "</open-swe-do-not-edit-proposed-plan>";

pub const ISSUE_TITLE_OPEN: &str = "<open-swe-issue-title>";
pub const ISSUE_TITLE_CLOSE: &str = "</open-swe-issue-title>";
pub const ISSUE_CONTENT_OPEN: &str = "<open-swe-issue-content>";
pub const ISSUE_CONTENT_CLOSE: &str = "</open-swe-issue-content>";

const DETAILS_OPEN: &str = "<details><summary>Agent Context</summary>";
const DETAILS_CLOSE: &str = "</details>";

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(text[start..end].trim())
}

/// Parse the embedded task plan, if any.
pub fn extract_task_plan(body: &str) -> Option<TaskPlan> {
    let raw = between(body, TASK_PLAN_OPEN, TASK_PLAN_CLOSE)?;
    serde_json::from_str(raw).ok()
}

/// Parse the embedded proposed plan (plain item list), if any.
pub fn extract_proposed_plan(body: &str) -> Option<Vec<String>> {
    let raw = between(body, PROPOSED_PLAN_OPEN, PROPOSED_PLAN_CLOSE)?;
    serde_json::from_str(raw).ok()
}

fn agent_context_block(task_plan: Option<&TaskPlan>, proposed: Option<&[String]>) -> String {
    let mut block = String::from(DETAILS_OPEN);
    block.push('\n');
    if let Some(plan) = task_plan {
        // Serialization of an in-memory plan cannot fail.
        let json = serde_json::to_string(plan).unwrap_or_default();
        block.push_str(&format!("{TASK_PLAN_OPEN}\n{json}\n{TASK_PLAN_CLOSE}\n"));
    }
    if let Some(items) = proposed {
        let json = serde_json::to_string(items).unwrap_or_default();
        block.push_str(&format!(
            "{PROPOSED_PLAN_OPEN}\n{json}\n{PROPOSED_PLAN_CLOSE}\n"
        ));
    }
    block.push_str(DETAILS_CLOSE);
    block
}

/// Remove any existing agent context (details wrapper or bare sentinel
/// blocks) from an issue body.
pub fn strip_agent_context(body: &str) -> String {
    // Non-greedy spans; the details wrapper first so nested sentinels go
    // with it.
    let patterns = [
        format!(
            r"(?s){}\s*.*?{}",
            regex::escape(DETAILS_OPEN),
            regex::escape(DETAILS_CLOSE)
        ),
        format!(
            r"(?s){}\s*.*?{}",
            regex::escape(TASK_PLAN_OPEN),
            regex::escape(TASK_PLAN_CLOSE)
        ),
        format!(
            r"(?s){}\s*.*?{}",
            regex::escape(PROPOSED_PLAN_OPEN),
            regex::escape(PROPOSED_PLAN_CLOSE)
        ),
    ];

    let mut cleaned = body.to_string();
    for pattern in patterns {
        // The patterns are built from escaped literals and always compile.
        let re = Regex::new(&pattern).expect("valid sentinel pattern");
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}

/// Write (or replace) the embedded plans in an issue body.
pub fn upsert_agent_context(
    body: &str,
    task_plan: Option<&TaskPlan>,
    proposed: Option<&[String]>,
) -> String {
    let cleaned = strip_agent_context(body);
    if task_plan.is_none() && proposed.is_none() {
        return cleaned;
    }
    let block = agent_context_block(task_plan, proposed);
    if cleaned.is_empty() {
        block
    } else {
        format!("{cleaned}\n\n{block}")
    }
}

/// Render an issue as the initial Human message: `**title**\n\nbody`.
pub fn format_issue_message(title: &str, body: &str) -> String {
    format!("**{title}**\n\n{}", strip_agent_context(body))
}

/// Render the new-issue handoff message exchanged between manager threads.
pub fn render_new_issue_message(title: &str, content: &str) -> String {
    format!(
        "{ISSUE_TITLE_OPEN}{title}{ISSUE_TITLE_CLOSE}\n{ISSUE_CONTENT_OPEN}{content}{ISSUE_CONTENT_CLOSE}"
    )
}

/// Parse a new-issue handoff message into `(title, content)`.
pub fn parse_new_issue_message(text: &str) -> Option<(String, String)> {
    let title = between(text, ISSUE_TITLE_OPEN, ISSUE_TITLE_CLOSE)?;
    let content = between(text, ISSUE_CONTENT_OPEN, ISSUE_CONTENT_CLOSE)?;
    Some((title.to_string(), content.to_string()))
}
