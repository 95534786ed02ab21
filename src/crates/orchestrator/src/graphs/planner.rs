//! Planner graph: context gathering and plan proposal
//!
//! `prepare-graph-state -> initialize-sandbox ->
//! generate-plan-context-action <-> take-plan-actions -> generate-plan ->
//! notetaker -> interrupt-proposed-plan`, with `determine-needs-context`
//! and `diagnose-error` on the side. The context loop ends as soon as the
//! model answers without tool calls (or the action budget runs out).

use crate::error::{OrchestratorError, Result};
use crate::graphs::{
    last_internal_ai, latest_human_message, require_repository, AgentDeps, PROGRAMMER_GRAPH_ID,
};
use crate::issue_format::upsert_agent_context;
use crate::state::{self, keys, kwargs, SessionRef};
use graph_core::{
    Command, ChatRequest, Goto, GraphBuilder, Message, NodeOutcome, RunContext, StartRun,
    StateMap, END, START,
};
use llm::{structured_call, StructuredSpec, TaskClass};
use serde_json::{json, Value};
use std::sync::Arc;
use tools::{SafetyEvaluator, ToolContext, ToolRegistry, ToolRunner};
use tracing::{info, warn};
use uuid::Uuid;

/// Context-gathering actions allowed before planning proceeds regardless
const MAX_CONTEXT_ACTIONS: usize = 6;

const CONTEXT_PROMPT: &str = "You are planning a code change. Explore the repository with the \
available read tools until you understand what the change requires, then answer WITHOUT tool \
calls to move on to writing the plan. Be frugal: every tool call costs a round trip.";

const NOTETAKER_PROMPT: &str = "Distill the conversation and proposed plan into concise context \
notes for the programmer: key files, conventions, commands, and pitfalls. Never include full \
source files or code blocks.";

/// Read-oriented tool set bound during context gathering.
fn planner_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tools::core::shell::shell_tool());
    registry.register(tools::core::search::grep_tool());
    registry.register(tools::core::files::view_tool());
    registry.register(tools::core::web::get_url_content_tool());
    registry.register(tools::core::search::search_document_tool());
    registry.register(tools::core::notes::scratchpad_tool());
    registry
}

/// Build the planner graph.
pub fn build(deps: AgentDeps) -> Result<graph_core::Graph> {
    let schema = state::thread_schema();

    let d1 = deps.clone();
    let d2 = deps.clone();
    let d3 = deps.clone();
    let d4 = deps.clone();
    let d5 = deps.clone();
    let d6 = deps.clone();
    let d7 = deps.clone();
    let d8 = deps;

    let graph = GraphBuilder::new(crate::graphs::PLANNER_GRAPH_ID, schema)
        .add_node("prepare-graph-state", move |state, _ctx| {
            let deps = d1.clone();
            Box::pin(async move {
                prepare_graph_state(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("initialize-sandbox", move |state, _ctx| {
            let deps = d2.clone();
            Box::pin(async move {
                initialize_sandbox(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("generate-plan-context-action", move |state, _ctx| {
            let deps = d3.clone();
            Box::pin(async move {
                generate_plan_context_action(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node_with_ends(
            "take-plan-actions",
            vec!["generate-plan-context-action", "diagnose-error", "generate-plan"],
            move |state, _ctx| {
                let deps = d4.clone();
                Box::pin(async move {
                    take_plan_actions(deps, state)
                        .await
                        .map_err(graph_core::GraphError::from)
                })
            },
        )
        .add_node("diagnose-error", move |state, _ctx| {
            let deps = d5.clone();
            Box::pin(async move {
                diagnose_error(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("generate-plan", move |state, _ctx| {
            let deps = d6.clone();
            Box::pin(async move {
                generate_plan(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("notetaker", move |state, _ctx| {
            let deps = d7.clone();
            Box::pin(async move {
                notetaker(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node_with_ends(
            "interrupt-proposed-plan",
            vec!["determine-needs-context", END],
            {
                let deps = d8.clone();
                move |state, ctx| {
                    let deps = deps.clone();
                    Box::pin(async move {
                        interrupt_proposed_plan(deps, state, ctx)
                            .await
                            .map_err(graph_core::GraphError::from)
                    })
                }
            },
        )
        .add_node_with_ends(
            "determine-needs-context",
            vec!["generate-plan-context-action", "generate-plan"],
            move |state, _ctx| {
                let deps = d8.clone();
                Box::pin(async move {
                    determine_needs_context(deps, state)
                        .await
                        .map_err(graph_core::GraphError::from)
                })
            },
        )
        .add_edge(START, "prepare-graph-state")
        .add_edge("prepare-graph-state", "initialize-sandbox")
        .add_edge("initialize-sandbox", "generate-plan-context-action")
        .add_conditional_edge(
            "generate-plan-context-action",
            |state| {
                // Tool calls pending -> execute them; a plain answer means
                // the model is ready to plan.
                match last_internal_ai(state) {
                    Some(message) if message.has_tool_calls() => "take-plan-actions".to_string(),
                    _ => "generate-plan".to_string(),
                }
            },
            &[
                ("take-plan-actions", "take-plan-actions"),
                ("generate-plan", "generate-plan"),
            ],
        )
        .add_edge("diagnose-error", "generate-plan-context-action")
        .add_edge("generate-plan", "notetaker")
        .add_edge("notetaker", "interrupt-proposed-plan")
        .compile()?;

    Ok(graph)
}

/// Load issue context and untracked comments. Skipped in local mode.
async fn prepare_graph_state(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    if deps.config.local_mode {
        return Ok(NodeOutcome::empty());
    }

    let repo = require_repository(&state)?;
    let issue_id = crate::graphs::require_issue_id(&state)?;

    let (issue, comments) = tokio::join!(
        deps.scm.get_issue(&repo, issue_id),
        deps.scm.list_issue_comments(&repo, issue_id),
    );
    let issue = issue.map_err(|e| OrchestratorError::External(e.to_string()))?;
    let comments = comments.map_err(|e| OrchestratorError::External(e.to_string()))?;

    let mut new_messages: Vec<Message> = Vec::new();
    if !state::has_user_message(&state) {
        new_messages.push(
            Message::human(crate::issue_format::format_issue_message(
                &issue.title,
                &issue.body,
            ))
            .with_kwarg(kwargs::IS_ORIGINAL_ISSUE, json!(true))
            .with_kwarg(kwargs::GITHUB_ISSUE_ID, json!(issue_id)),
        );
    }

    let tracked: Vec<u64> = state
        .get(keys::TRACKED_COMMENT_IDS)
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    let mut now_tracked = tracked.clone();
    for comment in &comments {
        if tracked.contains(&comment.id) || comment.author.ends_with("[bot]") {
            continue;
        }
        new_messages.push(Message::human(format!(
            "Comment from @{}:\n{}",
            comment.author, comment.body
        )));
        now_tracked.push(comment.id);
    }

    let mut update = StateMap::new();
    if !new_messages.is_empty() {
        let value = serde_json::to_value(&new_messages)?;
        update.insert(keys::MESSAGES.into(), value.clone());
        update.insert(keys::INTERNAL_MESSAGES.into(), value);
    }
    update.insert(keys::TRACKED_COMMENT_IDS.into(), json!(now_tracked));
    if let Some(plan) = crate::issue_format::extract_task_plan(&issue.body) {
        update.extend(state::task_plan_update(&plan));
    }
    Ok(NodeOutcome::Update(update))
}

/// Acquire (or recover) the execution sandbox. See the sandbox crate for
/// the reuse/restart/recreate ladder. Shared with the programmer graph.
pub(crate) async fn initialize_sandbox(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    if deps.config.local_mode {
        let mut update = StateMap::new();
        update.insert(keys::SANDBOX_SESSION_ID.into(), json!(sandbox::LOCAL_MOCK_ID));
        return Ok(NodeOutcome::Update(update));
    }

    let repo = require_repository(&state)?;
    let branch = state::branch_name(&state).ok_or_else(|| {
        OrchestratorError::Validation("missing branch name for sandbox checkout".into())
    })?;
    let auth = deps.git_auth().await;

    let result = deps
        .coordinator
        .acquire(
            state::sandbox_session_id(&state).as_deref(),
            &repo,
            &branch,
            &auth,
        )
        .await?;

    let mut update = StateMap::new();
    update.insert(keys::SANDBOX_SESSION_ID.into(), json!(result.sandbox.id));
    if let Some(tree) = result.codebase_tree {
        update.insert(keys::CODEBASE_TREE.into(), json!(tree));
    }
    if let Some(installed) = result.dependencies_installed {
        update.insert(keys::DEPENDENCIES_INSTALLED.into(), json!(installed));
    }
    Ok(NodeOutcome::Update(update))
}

fn context_system_prompt(state: &StateMap) -> String {
    let mut prompt = String::from(CONTEXT_PROMPT);
    if let Some(tree) = state::string_field(state, keys::CODEBASE_TREE) {
        prompt.push_str(&format!("\n\nRepository layout:\n{tree}"));
    }
    if let Some(rules) = state::string_field(state, keys::CUSTOM_RULES) {
        prompt.push_str(&format!("\n\nRepository rules:\n{rules}"));
    }
    prompt
}

/// One context-gathering model turn with read tools bound.
async fn generate_plan_context_action(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let mut messages = vec![Message::system(context_system_prompt(&state))];
    messages.extend(state::internal_messages(&state));

    let request = ChatRequest::new(messages).with_tools(planner_registry().definitions());
    let response = deps.router.chat(TaskClass::Planner, request).await?;

    let mut ai = response.message.clone();
    ai.ensure_id();
    let mut update = state::internal_message_update(&[ai]);
    update.insert(
        keys::TOKEN_DATA.into(),
        json!({ "planner_tokens": response.usage.total() }),
    );
    Ok(NodeOutcome::Update(update))
}

/// Execute the pending context tool calls.
async fn take_plan_actions(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let message = last_internal_ai(&state).ok_or_else(|| {
        OrchestratorError::Validation("take-plan-actions without an AI message".into())
    })?;

    // Local mode gates commands through the safety evaluator, fail-closed.
    let (message, blocked) = if deps.config.local_mode {
        SafetyEvaluator::new(deps.router.clone())
            .filter_unsafe_calls(&message)
            .await
    } else {
        (message, Vec::new())
    };

    let backend = deps.backend(&state)?;
    let runner = ToolRunner::new(Arc::new(planner_registry()));
    let ctx = ToolContext::new(state.clone(), backend);
    let result = runner.execute_calls(message.tool_calls(), &ctx).await;

    let mut new_messages = vec![message.clone()];
    new_messages.extend(result.messages.clone());
    let mut update = state::internal_message_update(&new_messages);
    for (key, value) in &result.state_updates {
        update.insert(key.clone(), value.clone());
    }

    let actions = state::usize_field(&state, keys::CONTEXT_ACTIONS_COUNT) + 1;
    update.insert(keys::CONTEXT_ACTIONS_COUNT.into(), json!(actions));

    let goto = if !result.all_succeeded() {
        "diagnose-error"
    } else if actions >= MAX_CONTEXT_ACTIONS {
        info!(actions, "context action budget reached, moving to plan");
        "generate-plan"
    } else {
        "generate-plan-context-action"
    };
    if !blocked.is_empty() {
        warn!(blocked = blocked.len(), "context actions partially blocked");
    }

    Ok(NodeOutcome::Command(
        Command::new().with_update(update).with_goto(goto),
    ))
}

/// Analyze a failing tool invocation and append the diagnosis. Shared
/// with the programmer graph.
pub(crate) async fn diagnose_error(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let internal = state::internal_messages(&state);
    let failing = internal
        .iter()
        .rev()
        .find(|m| m.content.starts_with("Error:"))
        .map(|m| m.content.clone())
        .unwrap_or_else(|| "unknown tool failure".to_string());

    let request = ChatRequest::new(vec![
        Message::system(
            "A tool invocation failed. Diagnose the likely cause and say how to proceed.",
        ),
        Message::human(failing),
    ]);
    let response = deps.router.chat(TaskClass::Planner, request).await?;

    let diagnosis = Message::ai(format!("Diagnosis: {}", response.message.content));
    Ok(NodeOutcome::Update(state::internal_message_update(&[
        diagnosis,
    ])))
}

fn plan_spec() -> StructuredSpec {
    StructuredSpec::new(
        "session_plan",
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "plan": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1
                }
            },
            "required": ["title", "plan"]
        }),
    )
}

/// Produce the ordered plan item list via a structured tool call.
async fn generate_plan(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let mut messages = vec![Message::system(
        "Write the execution plan for the user's request: a short title and an ordered list of \
         concrete, independently verifiable steps. Base it only on what you learned about the \
         repository.",
    )];
    messages.extend(state::internal_messages(&state));

    let value = structured_call(&deps.router, TaskClass::Planner, messages, &plan_spec()).await?;
    let items: Vec<String> = value["plan"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    info!(items = items.len(), "plan proposed");
    let mut update = StateMap::new();
    update.insert(keys::PROPOSED_PLAN.into(), json!(items));
    update.insert(
        keys::PROPOSED_PLAN_TITLE.into(),
        value["title"].clone(),
    );
    Ok(NodeOutcome::Update(update))
}

/// Distill the conversation into bounded context notes.
async fn notetaker(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let mut transcript = String::new();
    for message in state::internal_messages(&state) {
        transcript.push_str(&format!("[{:?}] {}\n", message.role, message.content));
    }
    if let Some(plan) = state::proposed_plan(&state) {
        transcript.push_str(&format!("\nProposed plan:\n- {}", plan.join("\n- ")));
    }

    let request = ChatRequest::new(vec![
        Message::system(NOTETAKER_PROMPT),
        Message::human(transcript),
    ]);
    let response = deps.router.chat(TaskClass::Summarizer, request).await?;

    let mut update = StateMap::new();
    update.insert(
        keys::CONTEXT_GATHERING_NOTES.into(),
        json!(response.message.content),
    );
    Ok(NodeOutcome::Update(update))
}

/// Pause for plan approval, or accept directly under auto-accept.
async fn interrupt_proposed_plan(
    deps: AgentDeps,
    state: StateMap,
    ctx: RunContext,
) -> Result<NodeOutcome> {
    let proposed = state::proposed_plan(&state).ok_or_else(|| {
        OrchestratorError::Validation("no proposed plan to review".into())
    })?;
    let title = state::string_field(&state, keys::PROPOSED_PLAN_TITLE)
        .unwrap_or_else(|| "Proposed work".to_string());

    if state::auto_accept_plan(&state) {
        return accept_plan(&deps, &state, &ctx, &title, proposed).await;
    }

    let response = match ctx.resume_value() {
        Some(value) => value.clone(),
        None => {
            return Ok(NodeOutcome::Interrupt(json!({
                "proposed_plan": proposed,
                "title": title,
            })))
        }
    };

    let response_type = response
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(if response.as_bool() == Some(true) {
            "approve"
        } else {
            "ignore"
        });

    match response_type {
        "approve" | "accept" => accept_plan(&deps, &state, &ctx, &title, proposed).await,
        "response" | "edit" => {
            let text = response
                .get("response")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let human = Message::human(text);
            let mut update = state::message_update(&human);
            // A fresh look at the plan needs a fresh action budget.
            update.insert(keys::CONTEXT_ACTIONS_COUNT.into(), json!(0));
            Ok(NodeOutcome::Command(
                Command::new()
                    .with_update(update)
                    .with_goto("determine-needs-context"),
            ))
        }
        _ => {
            info!("proposed plan rejected; ending planner run");
            Ok(NodeOutcome::Command(Command::new().with_goto(Goto::End)))
        }
    }
}

/// Record the accepted plan and hand off to the programmer.
async fn accept_plan(
    deps: &AgentDeps,
    state: &StateMap,
    ctx: &RunContext,
    title: &str,
    items: Vec<String>,
) -> Result<NodeOutcome> {
    let request_text = latest_human_message(state)
        .map(|m| m.content)
        .unwrap_or_else(|| title.to_string());

    let mut plan = state::task_plan(state).unwrap_or_default();
    plan.create_task(request_text, title, items.clone(), None);

    // Persist the accepted plan into the issue body for cross-session
    // recovery.
    if !deps.config.local_mode {
        if let (Ok(repo), Some(issue_id)) =
            (require_repository(state), state::github_issue_id(state))
        {
            if let Ok(issue) = deps.scm.get_issue(&repo, issue_id).await {
                let body = upsert_agent_context(&issue.body, Some(&plan), None);
                if let Err(e) = deps.scm.update_issue_body(&repo, issue_id, &body).await {
                    warn!(error = %e, "failed to persist plan to issue");
                }
            }
        }
    }

    let programmer_thread = state::session_ref(state, keys::PROGRAMMER_SESSION)
        .map(|session| session.thread_id)
        .unwrap_or_else(Uuid::new_v4);

    let mut initial = state::task_plan_update(&plan);
    for key in [
        keys::TARGET_REPOSITORY,
        keys::GITHUB_ISSUE_ID,
        keys::BRANCH_NAME,
        keys::SANDBOX_SESSION_ID,
        keys::CODEBASE_TREE,
        keys::CONTEXT_GATHERING_NOTES,
        keys::DEPENDENCIES_INSTALLED,
        keys::CUSTOM_RULES,
        keys::REVIEW_TRIGGER,
    ] {
        if let Some(value) = state.get(key) {
            if !value.is_null() {
                initial.insert(key.into(), value.clone());
            }
        }
    }

    let handle = ctx
        .start_run(
            StartRun::new(PROGRAMMER_GRAPH_ID)
                .on_thread(programmer_thread)
                .with_update(initial),
        )
        .await?;
    let session = SessionRef {
        thread_id: handle.thread_id,
        run_id: handle.run_id,
    };
    info!(thread = %session.thread_id, "programmer launched with accepted plan");

    let mut update = state::task_plan_update(&plan);
    update.insert(keys::PROGRAMMER_SESSION.into(), serde_json::to_value(session)?);
    Ok(NodeOutcome::Command(Command::end(update)))
}

fn needs_context_spec() -> StructuredSpec {
    StructuredSpec::new(
        "needs_context",
        json!({
            "type": "object",
            "properties": {
                "needs_context": { "type": "boolean" },
                "reasoning": { "type": "string" }
            },
            "required": ["needs_context", "reasoning"]
        }),
    )
}

/// Decide whether the user's plan feedback requires more exploration.
async fn determine_needs_context(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let mut messages = vec![Message::system(
        "The user responded to the proposed plan. Decide whether revising the plan requires \
         gathering more repository context first.",
    )];
    messages.extend(state::internal_messages(&state));

    let value = structured_call(
        &deps.router,
        TaskClass::Planner,
        messages,
        &needs_context_spec(),
    )
    .await?;

    let goto = if value["needs_context"].as_bool().unwrap_or(false) {
        "generate-plan-context-action"
    } else {
        "generate-plan"
    };
    Ok(NodeOutcome::Command(Command::new().with_goto(goto)))
}
