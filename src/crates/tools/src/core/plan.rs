//! Plan and workflow marker tools
//!
//! These tools exist for the model to call; the orchestrator's nodes
//! intercept them before dispatch (completing tasks, opening PRs, raising
//! interrupts). The executors only acknowledge, so a stray dispatch is
//! harmless.

use crate::registry::{Tool, ToolFuture, ToolOutcome};
use serde_json::{json, Value};

fn marker(name: &str, description: &str, schema: Value) -> Tool {
    let ack = format!("{name} acknowledged");
    Tool::new(name, description, schema, move |_args, _ctx| -> ToolFuture {
        let ack = ack.clone();
        Box::pin(async move { Ok(ToolOutcome::success(ack)) })
    })
}

/// `session_plan` - emit the ordered plan items (planner structured output)
pub fn session_plan_tool() -> Tool {
    marker(
        "session_plan",
        "Record the final execution plan as an ordered list of plan items.",
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Short task title" },
                "plan": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Ordered plan items, one actionable directive each"
                }
            },
            "required": ["title", "plan"]
        }),
    )
}

/// `update_plan` - revise the remaining plan items
pub fn update_plan_tool() -> Tool {
    marker(
        "update_plan",
        "Revise the remaining plan items. Completed items cannot be changed.",
        json!({
            "type": "object",
            "properties": {
                "update_plan_reasoning": {
                    "type": "string",
                    "description": "Why the plan needs to change"
                },
                "plan_items": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "The new remaining plan items, in execution order"
                }
            },
            "required": ["update_plan_reasoning"]
        }),
    )
}

/// `mark_task_completed` - close out the current plan item
pub fn mark_task_completed_tool() -> Tool {
    marker(
        "mark_task_completed",
        "Mark the current plan item as completed, with a summary of what was done.",
        json!({
            "type": "object",
            "properties": {
                "completed_task_summary": { "type": "string" }
            },
            "required": ["completed_task_summary"]
        }),
    )
}

/// `mark_task_not_completed` - report that the current plan item is not done
pub fn mark_task_not_completed_tool() -> Tool {
    marker(
        "mark_task_not_completed",
        "Report that the current plan item cannot be completed yet and why.",
        json!({
            "type": "object",
            "properties": {
                "reasoning": { "type": "string" }
            },
            "required": ["reasoning"]
        }),
    )
}

/// `request_human_help` - suspend for operator input
pub fn request_human_help_tool() -> Tool {
    marker(
        "request_human_help",
        "Ask the human operator for help when blocked. Suspends work until a response arrives.",
        json!({
            "type": "object",
            "properties": {
                "help_request": { "type": "string" }
            },
            "required": ["help_request"]
        }),
    )
}

/// `open_pr` - open the pull request for the finished task
pub fn open_pr_tool() -> Tool {
    marker(
        "open_pr",
        "Open a pull request for the completed work.",
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "body": { "type": "string" }
            },
            "required": ["title"]
        }),
    )
}

/// Review-reply tools, registered only when a PR review triggered the run
pub fn review_reply_tools() -> Vec<Tool> {
    vec![
        marker(
            "reply_to_comment",
            "Reply to an issue or PR comment.",
            json!({
                "type": "object",
                "properties": {
                    "comment_id": { "type": "number" },
                    "reply": { "type": "string" }
                },
                "required": ["comment_id", "reply"]
            }),
        ),
        marker(
            "reply_to_review_comment",
            "Reply to an inline review comment.",
            json!({
                "type": "object",
                "properties": {
                    "comment_id": { "type": "number" },
                    "reply": { "type": "string" }
                },
                "required": ["comment_id", "reply"]
            }),
        ),
        marker(
            "reply_to_review",
            "Reply to a review summary.",
            json!({
                "type": "object",
                "properties": {
                    "review_id": { "type": "number" },
                    "reply": { "type": "string" }
                },
                "required": ["review_id", "reply"]
            }),
        ),
    ]
}
