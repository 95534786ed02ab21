//! Thread state schema and typed accessors
//!
//! All four agent graphs share one state shape. Message channels merge by
//! id; the document cache, token data, and approval set merge as object
//! unions (so concurrent writers cannot drop each other's entries);
//! everything else replaces.

use crate::plan::TaskPlan;
use graph_core::{messages_from_value, Message, StateMap, StateSchema};
use sandbox::TargetRepository;
use serde_json::{json, Value};
use uuid::Uuid;

/// State field names shared by the agent graphs
pub mod keys {
    /// Client-visible conversation
    pub const MESSAGES: &str = "messages";
    /// Model-facing conversation, truncatable by summarization
    pub const INTERNAL_MESSAGES: &str = "internal_messages";
    pub const TASK_PLAN: &str = "task_plan";
    pub const PROPOSED_PLAN: &str = "proposed_plan";
    pub const SANDBOX_SESSION_ID: &str = "sandbox_session_id";
    pub const BRANCH_NAME: &str = "branch_name";
    pub const TARGET_REPOSITORY: &str = "target_repository";
    pub const CODEBASE_TREE: &str = "codebase_tree";
    pub const DOCUMENT_CACHE: &str = "document_cache";
    pub const GITHUB_ISSUE_ID: &str = "github_issue_id";
    pub const DEPENDENCIES_INSTALLED: &str = "dependencies_installed";
    pub const CUSTOM_RULES: &str = "custom_rules";
    pub const REVIEWS_COUNT: &str = "reviews_count";
    pub const TOKEN_DATA: &str = "token_data";
    /// Object-as-set of approved operation keys
    pub const APPROVED_OPERATIONS: &str = "approved_operations";
    pub const SCRATCHPAD: &str = "scratchpad";
    pub const TECHNICAL_NOTES: &str = "technical_notes";
    pub const CONTEXT_GATHERING_NOTES: &str = "context_gathering_notes";
    pub const CONTEXT_ACTIONS_COUNT: &str = "context_actions_count";
    pub const AUTO_ACCEPT_PLAN: &str = "auto_accept_plan";
    pub const PLANNER_SESSION: &str = "planner_session";
    pub const PROGRAMMER_SESSION: &str = "programmer_session";
    pub const REVIEWER_SESSION: &str = "reviewer_session";
    pub const TRACKED_COMMENT_IDS: &str = "tracked_comment_ids";
    /// Route chosen by the manager's classifier for the dispatch node
    pub const MANAGER_ROUTE: &str = "manager_route";
    /// Title accompanying the proposed plan
    pub const PROPOSED_PLAN_TITLE: &str = "proposed_plan_title";
    /// Whether this session was triggered by a PR review; gates the
    /// review-reply tools
    pub const REVIEW_TRIGGER: &str = "review_trigger";
}

/// Message kwargs the orchestrator reads and writes
pub mod kwargs {
    pub const IS_ORIGINAL_ISSUE: &str = "is_original_issue";
    pub const GITHUB_ISSUE_ID: &str = "github_issue_id";
    pub const REQUEST_SOURCE: &str = "request_source";
    pub const HIDDEN: &str = "hidden";
    pub const SUMMARY_MESSAGE: &str = "summary_message";

    pub const SOURCE_ISSUE_WEBHOOK: &str = "github_issue_webhook";
    pub const SOURCE_PR_REVIEW_WEBHOOK: &str = "github_pr_review_webhook";
}

/// Schema shared by all agent graph threads.
pub fn thread_schema() -> StateSchema {
    StateSchema::new()
        .messages_field(keys::MESSAGES)
        .messages_field(keys::INTERNAL_MESSAGES)
        .field(keys::TASK_PLAN, Value::Null)
        .field(keys::PROPOSED_PLAN, Value::Null)
        .field(keys::SANDBOX_SESSION_ID, Value::Null)
        .field(keys::BRANCH_NAME, Value::Null)
        .field(keys::TARGET_REPOSITORY, Value::Null)
        .field(keys::CODEBASE_TREE, Value::Null)
        .merged_field(keys::DOCUMENT_CACHE)
        .field(keys::GITHUB_ISSUE_ID, Value::Null)
        .field(keys::DEPENDENCIES_INSTALLED, json!(false))
        .field(keys::CUSTOM_RULES, Value::Null)
        .field(keys::REVIEWS_COUNT, json!(0))
        .merged_field(keys::TOKEN_DATA)
        .merged_field(keys::APPROVED_OPERATIONS)
        .field(keys::SCRATCHPAD, json!([]))
        .field(keys::TECHNICAL_NOTES, Value::Null)
        .field(keys::CONTEXT_GATHERING_NOTES, Value::Null)
        .field(keys::CONTEXT_ACTIONS_COUNT, json!(0))
        .field(keys::AUTO_ACCEPT_PLAN, json!(false))
        .field(keys::PLANNER_SESSION, Value::Null)
        .field(keys::PROGRAMMER_SESSION, Value::Null)
        .field(keys::REVIEWER_SESSION, Value::Null)
        .field(keys::TRACKED_COMMENT_IDS, json!([]))
        .field(keys::MANAGER_ROUTE, Value::Null)
        .field(keys::PROPOSED_PLAN_TITLE, Value::Null)
        .field(keys::REVIEW_TRIGGER, json!(false))
}

/// `(thread_id, run_id)` record of a launched child run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct SessionRef {
    pub thread_id: Uuid,
    pub run_id: Uuid,
}

pub fn messages(state: &StateMap) -> Vec<Message> {
    messages_from_value(state.get(keys::MESSAGES))
}

pub fn internal_messages(state: &StateMap) -> Vec<Message> {
    messages_from_value(state.get(keys::INTERNAL_MESSAGES))
}

pub fn task_plan(state: &StateMap) -> Option<TaskPlan> {
    serde_json::from_value(state.get(keys::TASK_PLAN)?.clone()).ok()
}

pub fn proposed_plan(state: &StateMap) -> Option<Vec<String>> {
    serde_json::from_value(state.get(keys::PROPOSED_PLAN)?.clone()).ok()
}

pub fn target_repository(state: &StateMap) -> Option<TargetRepository> {
    serde_json::from_value(state.get(keys::TARGET_REPOSITORY)?.clone()).ok()
}

pub fn github_issue_id(state: &StateMap) -> Option<u64> {
    state.get(keys::GITHUB_ISSUE_ID)?.as_u64()
}

pub fn branch_name(state: &StateMap) -> Option<String> {
    state
        .get(keys::BRANCH_NAME)?
        .as_str()
        .map(str::to_string)
}

pub fn sandbox_session_id(state: &StateMap) -> Option<String> {
    state
        .get(keys::SANDBOX_SESSION_ID)?
        .as_str()
        .map(str::to_string)
}

pub fn session_ref(state: &StateMap, key: &str) -> Option<SessionRef> {
    serde_json::from_value(state.get(key)?.clone()).ok()
}

pub fn reviews_count(state: &StateMap) -> u32 {
    state
        .get(keys::REVIEWS_COUNT)
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32
}

pub fn auto_accept_plan(state: &StateMap) -> bool {
    state
        .get(keys::AUTO_ACCEPT_PLAN)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub fn bool_field(state: &StateMap, key: &str) -> bool {
    state.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn string_field(state: &StateMap, key: &str) -> Option<String> {
    state.get(key)?.as_str().map(str::to_string)
}

pub fn usize_field(state: &StateMap, key: &str) -> usize {
    state.get(key).and_then(Value::as_u64).unwrap_or(0) as usize
}

/// Whether the conversation already contains a non-hidden human message.
pub fn has_user_message(state: &StateMap) -> bool {
    messages(state)
        .iter()
        .any(|m| m.is_human() && !m.kwarg_flag(kwargs::HIDDEN))
}

/// Whether this session was triggered by a PR review.
///
/// True when the flag has been recorded on the thread or when any message
/// still carries the PR-review webhook source. The flag gates the
/// review-reply tools in the programmer's registry.
pub fn review_triggered(state: &StateMap) -> bool {
    if bool_field(state, keys::REVIEW_TRIGGER) {
        return true;
    }
    messages(state).iter().any(|m| {
        m.additional_kwargs
            .get(kwargs::REQUEST_SOURCE)
            .and_then(Value::as_str)
            == Some(kwargs::SOURCE_PR_REVIEW_WEBHOOK)
    })
}

/// Approved operation keys as a set of strings.
pub fn approved_operations(state: &StateMap) -> Vec<String> {
    state
        .get(keys::APPROVED_OPERATIONS)
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Build an update adding one message to both conversations.
pub fn message_update(message: &Message) -> StateMap {
    let value = serde_json::to_value(vec![message.clone()]).unwrap_or(Value::Null);
    let mut update = StateMap::new();
    update.insert(keys::MESSAGES.into(), value.clone());
    update.insert(keys::INTERNAL_MESSAGES.into(), value);
    update
}

/// Build an update adding messages to the internal conversation only.
pub fn internal_message_update(new_messages: &[Message]) -> StateMap {
    let value = serde_json::to_value(new_messages).unwrap_or(Value::Null);
    let mut update = StateMap::new();
    update.insert(keys::INTERNAL_MESSAGES.into(), value);
    update
}

/// Build an update storing the task plan.
pub fn task_plan_update(plan: &TaskPlan) -> StateMap {
    let mut update = StateMap::new();
    update.insert(
        keys::TASK_PLAN.into(),
        serde_json::to_value(plan).unwrap_or(Value::Null),
    );
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_core::MessageRole;

    #[test]
    fn schema_defaults_cover_every_key() {
        let defaults = thread_schema().defaults();
        for key in [
            keys::MESSAGES,
            keys::INTERNAL_MESSAGES,
            keys::TASK_PLAN,
            keys::DOCUMENT_CACHE,
            keys::APPROVED_OPERATIONS,
            keys::REVIEWS_COUNT,
            keys::TOKEN_DATA,
        ] {
            assert!(defaults.contains_key(key), "missing default for {key}");
        }
    }

    #[test]
    fn message_update_lands_in_both_channels() {
        let schema = thread_schema();
        let update = message_update(&Message::human("hello").with_id("m1"));
        let merged = schema.apply(schema.defaults(), update).unwrap();

        assert_eq!(messages(&merged).len(), 1);
        assert_eq!(internal_messages(&merged).len(), 1);
        assert_eq!(messages(&merged)[0].role, MessageRole::Human);
    }

    #[test]
    fn approved_operations_union_across_updates() {
        let schema = thread_schema();
        let mut state = schema.defaults();

        let mut first = StateMap::new();
        first.insert(keys::APPROVED_OPERATIONS.into(), json!({"shell:/work": true}));
        state = schema.apply(state, first).unwrap();

        let mut second = StateMap::new();
        second.insert(
            keys::APPROVED_OPERATIONS.into(),
            json!({"apply_patch:/work/src": true}),
        );
        state = schema.apply(state, second).unwrap();

        let mut approved = approved_operations(&state);
        approved.sort();
        assert_eq!(approved, vec!["apply_patch:/work/src", "shell:/work"]);
    }

    #[test]
    fn review_trigger_reads_flag_or_message_source() {
        let schema = thread_schema();
        let state = schema.defaults();
        assert!(!review_triggered(&state));

        let mut flagged = StateMap::new();
        flagged.insert(keys::REVIEW_TRIGGER.into(), json!(true));
        let flagged = schema.apply(state.clone(), flagged).unwrap();
        assert!(review_triggered(&flagged));

        let message = Message::human("please address my review").with_kwarg(
            kwargs::REQUEST_SOURCE,
            json!(kwargs::SOURCE_PR_REVIEW_WEBHOOK),
        );
        let tagged = schema.apply(state, message_update(&message)).unwrap();
        assert!(review_triggered(&tagged));
    }

    #[test]
    fn session_refs_roundtrip() {
        let schema = thread_schema();
        let reference = SessionRef {
            thread_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
        };

        let mut update = StateMap::new();
        update.insert(
            keys::PLANNER_SESSION.into(),
            serde_json::to_value(&reference).unwrap(),
        );
        let state = schema.apply(schema.defaults(), update).unwrap();

        assert_eq!(session_ref(&state, keys::PLANNER_SESSION), Some(reference));
    }
}
