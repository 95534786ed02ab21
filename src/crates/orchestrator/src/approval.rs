//! Write-approval gating
//!
//! Destructive tool calls pause for human approval unless the approval
//! cache already holds the call's key. The key is `(tool, normalized
//! target directory)`, so approving one write to a directory approves
//! further writes there for the lifetime of the thread. A falsy resume
//! drops the call from the AI message; remaining calls proceed.

use crate::state::keys;
use graph_core::{Message, StateMap, ToolCall};
use serde_json::{json, Value};
use std::collections::HashSet;
use tools::{approval_key_for_call, ApprovalKey, WRITE_COMMAND_TOOLS};
use tracing::{debug, info};

/// Decision for one proposed message's worth of tool calls
#[derive(Debug)]
pub enum ApprovalDecision {
    /// Every write call is covered; proceed with the original message.
    Proceed,

    /// A call needs human approval; interrupt with this payload.
    NeedsApproval {
        call: ToolCall,
        key: ApprovalKey,
        payload: Value,
    },
}

/// First write call on the message not covered by the cache.
pub fn check_write_approvals(
    state: &StateMap,
    message: &Message,
    process_cwd: &str,
) -> ApprovalDecision {
    let approved: HashSet<String> = state
        .get(keys::APPROVED_OPERATIONS)
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    for call in message.tool_calls() {
        if !WRITE_COMMAND_TOOLS.contains(&call.name.as_str()) {
            continue;
        }
        let key = approval_key_for_call(&call.name, &call.args, process_cwd);
        if approved.contains(key.as_str()) {
            debug!(key = %key, "write call auto-approved from cache");
            continue;
        }
        let payload = json!({
            "command": call.name,
            "args": call.args,
            "approval_key": key.as_str(),
        });
        return ApprovalDecision::NeedsApproval {
            call: call.clone(),
            key,
            payload,
        };
    }
    ApprovalDecision::Proceed
}

/// Apply a human's resume response to a pending approval.
///
/// A truthy response caches the key (the returned update unions it into
/// `approved_operations`) and keeps the call. A falsy response removes the
/// call from the message; the edited message replaces the original in the
/// conversation.
pub fn apply_approval_response(
    message: &Message,
    pending_call: &ToolCall,
    key: &ApprovalKey,
    response: &Value,
) -> (Message, Option<StateMap>) {
    let approved = match response {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty() && s != "false" && s != "no",
        Value::Null => false,
        other => other
            .get("approved")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    if approved {
        info!(key = %key, "write approved by user");
        let mut update = StateMap::new();
        update.insert(
            keys::APPROVED_OPERATIONS.into(),
            json!({ key.as_str(): true }),
        );
        (message.clone(), Some(update))
    } else {
        info!(key = %key, tool = %pending_call.name, "write rejected by user; dropping call");
        let mut edited = message.clone();
        let kept: Vec<ToolCall> = message
            .tool_calls()
            .iter()
            .filter(|c| c.id != pending_call.id)
            .cloned()
            .collect();
        edited.tool_calls = if kept.is_empty() { None } else { Some(kept) };
        (edited, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::thread_schema;

    fn state_with_approvals(approved: &[&str]) -> StateMap {
        let schema = thread_schema();
        let mut state = schema.defaults();
        let entries: serde_json::Map<String, Value> = approved
            .iter()
            .map(|key| ((*key).to_string(), json!(true)))
            .collect();
        state.insert(keys::APPROVED_OPERATIONS.into(), Value::Object(entries));
        state
    }

    fn shell_message(cwd: &str) -> Message {
        Message::ai("removing file").with_tool_calls(vec![ToolCall::new(
            "shell",
            json!({"cwd": cwd, "command": ["rm", "x"]}),
        )
        .with_id("c1")])
    }

    #[test]
    fn uncached_write_needs_approval() {
        let state = state_with_approvals(&[]);
        match check_write_approvals(&state, &shell_message("/work"), "/") {
            ApprovalDecision::NeedsApproval { key, payload, .. } => {
                assert_eq!(key.as_str(), "shell:/work");
                assert_eq!(payload["approval_key"], json!("shell:/work"));
                assert_eq!(payload["command"], json!("shell"));
            }
            ApprovalDecision::Proceed => panic!("expected approval request"),
        }
    }

    #[test]
    fn cached_key_auto_approves_equivalent_spellings() {
        let state = state_with_approvals(&["shell:/work"]);
        // Normalization collapses /work/../work to /work.
        match check_write_approvals(&state, &shell_message("/work/../work"), "/") {
            ApprovalDecision::Proceed => {}
            other => panic!("expected auto-approval, got {other:?}"),
        }
    }

    #[test]
    fn read_only_calls_never_gate() {
        let state = state_with_approvals(&[]);
        let message = Message::ai("looking").with_tool_calls(vec![ToolCall::new(
            "view",
            json!({"path": "/work/file.rs"}),
        )]);
        assert!(matches!(
            check_write_approvals(&state, &message, "/"),
            ApprovalDecision::Proceed
        ));
    }

    #[test]
    fn truthy_resume_caches_key_and_keeps_call() {
        let message = shell_message("/work");
        let call = message.tool_calls()[0].clone();
        let key = ApprovalKey::new("shell", "/work");

        let (edited, update) = apply_approval_response(&message, &call, &key, &json!(true));
        assert_eq!(edited.tool_calls().len(), 1);
        let update = update.unwrap();
        assert_eq!(
            update[keys::APPROVED_OPERATIONS]["shell:/work"],
            json!(true)
        );
    }

    #[test]
    fn falsy_resume_drops_only_the_pending_call() {
        let mut message = shell_message("/work");
        message.tool_calls.as_mut().unwrap().push(
            ToolCall::new("view", json!({"path": "/work/a.rs"})).with_id("c2"),
        );
        let call = message.tool_calls()[0].clone();
        let key = ApprovalKey::new("shell", "/work");

        let (edited, update) = apply_approval_response(&message, &call, &key, &json!(false));
        assert!(update.is_none());
        assert_eq!(edited.tool_calls().len(), 1);
        assert_eq!(edited.tool_calls()[0].id, "c2");
    }
}
