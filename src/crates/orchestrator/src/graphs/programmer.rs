//! Programmer graph: the code-writing tool loop
//!
//! `generate-action` produces a tool-calling turn; a conditional edge
//! dispatches on what the model asked for (act, complete a task, revise
//! the plan, ask for help, open the PR, or conclude). `take-action` runs
//! the safety and approval gates before executing, then commits and pushes
//! the results. After each completed plan item the routing contract
//! applies: remaining work, token ceiling, or review/conclusion.

use crate::approval::{apply_approval_response, check_write_approvals, ApprovalDecision};
use crate::context;
use crate::error::{OrchestratorError, Result};
use crate::graphs::{
    calls_tool, last_internal_ai, require_repository, tool_call_named, AgentDeps,
    REVIEWER_GRAPH_ID,
};
use crate::scm::OpenPrRequest;
use crate::state::{self, keys, SessionRef};
use graph_core::{
    ChatRequest, Command, Goto, GraphBuilder, Message, NodeOutcome, RunContext, StartRun,
    StateMap, END, START,
};
use llm::{structured_call, StructuredSpec, TaskClass, TokenCounter};
use sandbox::ExcludeList;
use serde_json::{json, Value};
use std::sync::Arc;
use tools::{default_registry, SafetyEvaluator, ToolContext, ToolRunner, WRITE_COMMAND_TOOLS};
use tracing::{info, warn};
use uuid::Uuid;

const PROGRAMMER_PROMPT: &str = "You are implementing a planned code change. Work on the \
current plan item only. Use the tools to inspect and edit the repository and run commands; \
call mark_task_completed with a summary when the current item is done, update_plan when the \
remaining items no longer fit reality, and request_human_help only when truly blocked.";

/// Tool registry for this thread: the review-reply tools are bound only
/// when the session was triggered by a PR review.
fn registry_for(state: &StateMap) -> tools::ToolRegistry {
    default_registry(state::review_triggered(state))
}

/// Build the programmer graph.
pub fn build(deps: AgentDeps) -> Result<graph_core::Graph> {
    let schema = state::thread_schema();

    let d1 = deps.clone();
    let d2 = deps.clone();
    let d3 = deps.clone();
    let d4 = deps.clone();
    let d5 = deps.clone();
    let d6 = deps.clone();
    let d7 = deps.clone();
    let d8 = deps.clone();
    let d9 = deps.clone();
    let d10 = deps;

    let graph = GraphBuilder::new(crate::graphs::PROGRAMMER_GRAPH_ID, schema)
        .add_node("initialize-sandbox", move |state, _ctx| {
            let deps = d1.clone();
            Box::pin(async move {
                initialize_sandbox(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("generate-action", move |state, _ctx| {
            let deps = d2.clone();
            Box::pin(async move {
                generate_action(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node_with_ends(
            "take-action",
            vec!["generate-action", "diagnose-error"],
            move |state, ctx| {
                let deps = d3.clone();
                Box::pin(async move {
                    take_action(deps, state, ctx)
                        .await
                        .map_err(graph_core::GraphError::from)
                })
            },
        )
        .add_node_with_ends(
            "handle-completed-task",
            vec![
                "route-to-review-or-conclusion",
                "summarize-history",
                "generate-action",
            ],
            move |state, _ctx| {
                let deps = d4.clone();
                Box::pin(async move {
                    handle_completed_task(deps, state)
                        .await
                        .map_err(graph_core::GraphError::from)
                })
            },
        )
        .add_node("summarize-history", move |state, _ctx| {
            let deps = d5.clone();
            Box::pin(async move {
                summarize_history(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("update-plan", move |state, _ctx| {
            let deps = d6.clone();
            Box::pin(async move {
                update_plan(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("diagnose-error", move |state, _ctx| {
            let deps = d7.clone();
            Box::pin(async move {
                diagnose_error(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("request-help", move |state, ctx| {
            let deps = d8.clone();
            Box::pin(async move {
                request_help(deps, state, ctx)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node_with_ends(
            "route-to-review-or-conclusion",
            vec!["generate-conclusion", END],
            move |state, ctx| {
                let deps = d9.clone();
                Box::pin(async move {
                    route_to_review_or_conclusion(deps, state, ctx)
                        .await
                        .map_err(graph_core::GraphError::from)
                })
            },
        )
        .add_node("open-pr", {
            let deps = d10.clone();
            move |state, _ctx| {
                let deps = deps.clone();
                Box::pin(async move {
                    open_pr(deps, state)
                        .await
                        .map_err(graph_core::GraphError::from)
                })
            }
        })
        .add_node("generate-conclusion", move |state, _ctx| {
            let deps = d10.clone();
            Box::pin(async move {
                generate_conclusion(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_edge(START, "initialize-sandbox")
        .add_edge("initialize-sandbox", "generate-action")
        .add_conditional_edge(
            "generate-action",
            |state| route_after_generate(state),
            &[
                ("take-action", "take-action"),
                ("handle-completed-task", "handle-completed-task"),
                ("update-plan", "update-plan"),
                ("request-help", "request-help"),
                ("open-pr", "open-pr"),
                (
                    "route-to-review-or-conclusion",
                    "route-to-review-or-conclusion",
                ),
            ],
        )
        .add_edge("summarize-history", "generate-action")
        .add_edge("update-plan", "generate-action")
        .add_edge("diagnose-error", "generate-action")
        .add_edge("request-help", "generate-action")
        .add_edge("open-pr", "generate-conclusion")
        .add_edge("generate-conclusion", END)
        .compile()?;

    Ok(graph)
}

/// Dispatch on what the model's last turn asked for.
fn route_after_generate(state: &StateMap) -> String {
    let Some(message) = last_internal_ai(state) else {
        return "route-to-review-or-conclusion".to_string();
    };

    let route = if calls_tool(&message, "mark_task_completed")
        || calls_tool(&message, "mark_task_not_completed")
    {
        "handle-completed-task"
    } else if calls_tool(&message, "request_human_help") {
        "request-help"
    } else if calls_tool(&message, "update_plan") {
        "update-plan"
    } else if calls_tool(&message, "open_pr") {
        "open-pr"
    } else if message.has_tool_calls() {
        "take-action"
    } else {
        "route-to-review-or-conclusion"
    };
    route.to_string()
}

/// Reacquire the sandbox when resuming a thread whose sandbox was
/// auto-deleted.
async fn initialize_sandbox(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    super::planner::initialize_sandbox(deps, state).await
}

fn programmer_system_prompt(state: &StateMap) -> String {
    let mut prompt = String::from(PROGRAMMER_PROMPT);

    if let Some(plan) = state::task_plan(state) {
        if let Some(task) = plan.active_task() {
            if let Some(item) = task.current_item() {
                prompt.push_str(&format!("\n\nCurrent plan item: {}", item.plan));
            }
            let remaining: Vec<String> = task
                .remaining_items()
                .iter()
                .map(|item| format!("{}. {}", item.index + 1, item.plan))
                .collect();
            if !remaining.is_empty() {
                prompt.push_str(&format!("\n\nRemaining plan:\n{}", remaining.join("\n")));
            }
        }
    }
    if let Some(notes) = state::string_field(state, keys::CONTEXT_GATHERING_NOTES) {
        prompt.push_str(&format!("\n\nContext notes:\n{notes}"));
    }
    if let Some(notes) = state::string_field(state, keys::TECHNICAL_NOTES) {
        prompt.push_str(&format!("\n\nTechnical notes:\n{notes}"));
    }
    if let Some(tree) = state::string_field(state, keys::CODEBASE_TREE) {
        prompt.push_str(&format!("\n\nRepository layout:\n{tree}"));
    }
    if let Some(rules) = state::string_field(state, keys::CUSTOM_RULES) {
        prompt.push_str(&format!("\n\nRepository rules:\n{rules}"));
    }
    prompt
}

/// One programmer model turn with the full tool set bound.
async fn generate_action(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    if state::task_plan(&state).and_then(|plan| plan.active_task().cloned()).is_none() {
        return Err(OrchestratorError::Validation(
            "programmer started without a task plan".into(),
        ));
    }

    let mut messages = vec![Message::system(programmer_system_prompt(&state))];
    messages.extend(state::internal_messages(&state));

    let request = ChatRequest::new(messages)
        .with_tools(registry_for(&state).definitions())
        .with_parallel_tool_calls(true);
    let response = deps.router.chat(TaskClass::Programmer, request).await?;

    let mut ai = response.message.clone();
    ai.ensure_id();
    let mut update = state::internal_message_update(&[ai]);
    update.insert(
        keys::TOKEN_DATA.into(),
        json!({ "programmer_tokens": response.usage.total() }),
    );
    Ok(NodeOutcome::Update(update))
}

/// Run the gates, execute the calls, then commit and push the results.
async fn take_action(deps: AgentDeps, state: StateMap, ctx: RunContext) -> Result<NodeOutcome> {
    let message = last_internal_ai(&state).ok_or_else(|| {
        OrchestratorError::Validation("take-action without an AI message".into())
    })?;

    // Safety gate first (local mode only), then the approval gate over
    // whatever survived.
    let (mut message, _blocked) = if deps.config.local_mode {
        SafetyEvaluator::new(deps.router.clone())
            .filter_unsafe_calls(&message)
            .await
    } else {
        (message, Vec::new())
    };

    let workdir = deps
        .backend(&state)
        .map(|b| b.workdir().to_string())
        .unwrap_or_else(|_| "/".to_string());
    let mut approval_updates = StateMap::new();
    let mut resume = ctx.resume_value().cloned();
    let mut approval_state = state.clone();

    loop {
        match check_write_approvals(&approval_state, &message, &workdir) {
            ApprovalDecision::Proceed => break,
            ApprovalDecision::NeedsApproval { call, key, payload } => {
                let Some(response) = resume.take() else {
                    return Ok(NodeOutcome::Interrupt(payload));
                };
                let (edited, update) =
                    apply_approval_response(&message, &call, &key, &response);
                message = edited;
                if let Some(update) = update {
                    // Keep checking against the union of old and new
                    // approvals.
                    let schema = state::thread_schema();
                    approval_state = schema.apply(approval_state, update.clone())?;
                    for (key, value) in update {
                        approval_updates.insert(key, value);
                    }
                }
            }
        }
    }

    let backend = deps.backend(&state)?;
    let registry = Arc::new(registry_for(&state));
    let runner = ToolRunner::new(registry);
    let tool_ctx = ToolContext::new(state.clone(), backend);
    let result = runner.execute_calls(message.tool_calls(), &tool_ctx).await;

    let mut new_messages = vec![message.clone()];
    new_messages.extend(result.messages.clone());
    let mut update = state::internal_message_update(&new_messages);
    for (key, value) in &result.state_updates {
        update.insert(key.clone(), value.clone());
    }
    for (key, value) in approval_updates {
        update.insert(key, value);
    }

    // Push whatever the tools changed; the first commit of a task opens
    // the draft PR.
    let wrote = message
        .tool_calls()
        .iter()
        .any(|c| WRITE_COMMAND_TOOLS.contains(&c.name.as_str()));
    if wrote && !deps.config.local_mode && result.all_succeeded() {
        if let Some(plan_update) = commit_and_maybe_open_pr(&deps, &state).await? {
            update.extend(plan_update);
        }
    }

    let goto = if result.all_succeeded() {
        "generate-action"
    } else {
        "diagnose-error"
    };
    Ok(NodeOutcome::Command(
        Command::new().with_update(update).with_goto(goto),
    ))
}

/// Commit pending work; open the draft PR on the task's first commit.
async fn commit_and_maybe_open_pr(
    deps: &AgentDeps,
    state: &StateMap,
) -> Result<Option<StateMap>> {
    let sandbox = deps.sandbox_handle(state)?;
    let workspace = deps.coordinator.workspace(&sandbox);
    let identity = deps.coordinator.config().identity();

    let outcome = workspace
        .commit_and_push(&identity, &ExcludeList::default_set(), deps.config.skip_ci)
        .await?;
    if !outcome.committed {
        return Ok(None);
    }

    let mut plan = match state::task_plan(state) {
        Some(plan) => plan,
        None => return Ok(None),
    };
    let task = match plan.active_task() {
        Some(task) => task.clone(),
        None => return Ok(None),
    };
    if task.pull_request_number.is_some() {
        return Ok(None);
    }

    let repo = require_repository(state)?;
    let branch = state::branch_name(state)
        .ok_or_else(|| OrchestratorError::Validation("missing branch name".into()))?;
    let base = repo.base_branch.clone().unwrap_or_else(|| "main".to_string());

    let pr = deps
        .scm
        .open_pull_request(
            &repo,
            OpenPrRequest {
                title: format!("[WIP]: {}", task.title),
                body: format!(
                    "Work in progress for #{}.\n\n{}",
                    state::github_issue_id(state).unwrap_or_default(),
                    deps.config.app_url
                ),
                head: branch,
                base,
                draft: true,
            },
        )
        .await
        .map_err(|e| OrchestratorError::External(e.to_string()))?;

    info!(pr = pr.number, "opened draft pull request");
    plan.add_pull_request_number_to_active_task(pr.number)?;
    Ok(Some(state::task_plan_update(&plan)))
}

/// Close out a plan item (or record that it is not done) and apply the
/// routing contract.
async fn handle_completed_task(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let message = last_internal_ai(&state).ok_or_else(|| {
        OrchestratorError::Validation("handle-completed-task without an AI message".into())
    })?;

    let mut plan = state::task_plan(&state).ok_or_else(|| {
        OrchestratorError::Validation("handle-completed-task without a task plan".into())
    })?;

    let mut new_messages = Vec::new();
    if let Some(call) = tool_call_named(&message, "mark_task_completed") {
        let summary = call.args["completed_task_summary"]
            .as_str()
            .unwrap_or("completed")
            .to_string();
        let task = plan
            .active_task()
            .cloned()
            .ok_or_else(|| OrchestratorError::Validation("no active task".into()))?;
        if let Some(item) = task.current_item() {
            plan.complete_plan_item(&task.id, item.index, summary.clone())?;
            info!(item = item.index, "plan item completed");
            new_messages.push(Message::tool(
                format!("Marked plan item {} as completed.", item.index + 1),
                call.id.clone(),
            ));
        } else {
            new_messages.push(Message::tool(
                "No incomplete plan item to mark.",
                call.id.clone(),
            ));
        }
    } else if let Some(call) = tool_call_named(&message, "mark_task_not_completed") {
        let reasoning = call.args["reasoning"].as_str().unwrap_or("").to_string();
        warn!(reasoning = %reasoning, "plan item reported not completed");
        new_messages.push(Message::tool(
            "Acknowledged; the plan item stays open.",
            call.id.clone(),
        ));
    }

    let mut update = state::internal_message_update(&new_messages);
    update.extend(state::task_plan_update(&plan));

    // Routing contract: finished -> review/conclude; over the token
    // ceiling -> summarize; otherwise keep working.
    let goto = if plan.remaining_plan_items().is_empty() {
        "route-to-review-or-conclusion"
    } else {
        let counter = TokenCounter::new(&deps.config.token_model);
        let internal = state::internal_messages(&state);
        if context::should_summarize(&internal, &counter, deps.config.max_internal_tokens) {
            "summarize-history"
        } else {
            "generate-action"
        }
    };

    Ok(NodeOutcome::Command(
        Command::new().with_update(update).with_goto(goto),
    ))
}

/// Compact the internal history into a hidden summary message.
async fn summarize_history(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let internal = state::internal_messages(&state);
    match context::summarize_history(&deps.router, &internal).await? {
        Some(channel_update) => {
            let mut update = StateMap::new();
            update.insert(keys::INTERNAL_MESSAGES.into(), Value::Array(channel_update));
            Ok(NodeOutcome::Update(update))
        }
        None => Ok(NodeOutcome::empty()),
    }
}

fn plan_items_spec() -> StructuredSpec {
    StructuredSpec::new(
        "apply_plan_update",
        json!({
            "type": "object",
            "properties": {
                "plan_items": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1
                }
            },
            "required": ["plan_items"]
        }),
    )
}

/// Two-step plan revision: reason first, then apply with the reasoning
/// embedded verbatim.
async fn update_plan(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let message = last_internal_ai(&state).ok_or_else(|| {
        OrchestratorError::Validation("update-plan without an AI message".into())
    })?;
    let call = tool_call_named(&message, "update_plan").ok_or_else(|| {
        OrchestratorError::Validation("update-plan without an update_plan call".into())
    })?;
    let mut plan = state::task_plan(&state).ok_or_else(|| {
        OrchestratorError::Validation("update-plan without a task plan".into())
    })?;
    let task = plan
        .active_task()
        .cloned()
        .ok_or_else(|| OrchestratorError::Validation("no active task".into()))?;

    let stated_reason = call.args["update_plan_reasoning"]
        .as_str()
        .unwrap_or("")
        .to_string();

    // Step 1: reason about what should change.
    let mut reasoning_messages = vec![Message::system(
        "The programmer wants to revise the remaining plan. Reason about what should change \
         and why, considering the work done so far.",
    )];
    reasoning_messages.extend(state::internal_messages(&state));
    reasoning_messages.push(Message::human(format!(
        "Stated reason for the revision: {stated_reason}"
    )));
    let reasoning = deps
        .router
        .chat(TaskClass::Programmer, ChatRequest::new(reasoning_messages))
        .await?
        .message
        .content;

    // Step 2: apply, with the reasoning carried verbatim into the prompt.
    let remaining: Vec<String> = task
        .remaining_items()
        .iter()
        .map(|item| item.plan.clone())
        .collect();
    let apply_messages = vec![
        Message::system(
            "Produce the new remaining plan items, in execution order. Completed items are \
             preserved automatically and must not be restated.",
        ),
        Message::human(format!(
            "Revision reasoning:\n{reasoning}\n\nCurrent remaining items:\n- {}",
            remaining.join("\n- ")
        )),
    ];
    let value = structured_call(
        &deps.router,
        TaskClass::Programmer,
        apply_messages,
        &plan_items_spec(),
    )
    .await?;
    let items: Vec<String> = value["plan_items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    plan.update_plan_items(&task.id, items, crate::plan::PlanAuthor::Agent)?;
    info!("plan revised by programmer");

    let mut update = state::task_plan_update(&plan);
    let tool_response = Message::tool("Plan updated.", call.id);
    update.extend(state::internal_message_update(&[tool_response]));
    Ok(NodeOutcome::Update(update))
}

/// Analyze the most recent tool failure.
async fn diagnose_error(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    super::planner::diagnose_error(deps, state).await
}

/// Suspend for operator help, then feed the answer back into the loop.
async fn request_help(_deps: AgentDeps, state: StateMap, ctx: RunContext) -> Result<NodeOutcome> {
    let message = last_internal_ai(&state).ok_or_else(|| {
        OrchestratorError::Validation("request-help without an AI message".into())
    })?;
    let call = tool_call_named(&message, "request_human_help").ok_or_else(|| {
        OrchestratorError::Validation("request-help without a help call".into())
    })?;

    let response = match ctx.resume_value() {
        Some(value) => value.clone(),
        None => {
            let help_request = call.args["help_request"].as_str().unwrap_or("");
            return Ok(NodeOutcome::Interrupt(json!({
                "help_request": help_request
            })));
        }
    };

    let text = response
        .get("response")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string());

    let tool_response = Message::tool("Help received.", call.id);
    let human = Message::human(format!("Operator guidance: {text}"));
    Ok(NodeOutcome::Update(state::internal_message_update(&[
        tool_response,
        human,
    ])))
}

/// Open (or finalize) the pull request the model asked for.
async fn open_pr(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let message = last_internal_ai(&state);
    let call = message.as_ref().and_then(|m| tool_call_named(m, "open_pr"));

    let mut update = StateMap::new();
    if !deps.config.local_mode {
        // Push anything still pending before the PR goes up.
        if let Some(plan_update) = commit_and_maybe_open_pr(&deps, &state).await? {
            update.extend(plan_update);
        }

        let plan = state::task_plan(&state);
        let has_pr = plan
            .as_ref()
            .and_then(|p| p.active_task())
            .and_then(|t| t.pull_request_number)
            .is_some();

        if !has_pr {
            let repo = require_repository(&state)?;
            let branch = state::branch_name(&state)
                .ok_or_else(|| OrchestratorError::Validation("missing branch name".into()))?;
            let base = repo.base_branch.clone().unwrap_or_else(|| "main".to_string());
            let title = call
                .as_ref()
                .and_then(|c| c.args["title"].as_str())
                .map(str::to_string)
                .or_else(|| {
                    plan.as_ref()
                        .and_then(|p| p.active_task())
                        .map(|t| t.title.clone())
                })
                .unwrap_or_else(|| "Automated change".to_string());
            let body = call
                .as_ref()
                .and_then(|c| c.args["body"].as_str())
                .unwrap_or("")
                .to_string();

            let pr = deps
                .scm
                .open_pull_request(
                    &repo,
                    OpenPrRequest {
                        title,
                        body,
                        head: branch,
                        base,
                        draft: false,
                    },
                )
                .await
                .map_err(|e| OrchestratorError::External(e.to_string()))?;

            if let Some(mut plan) = plan {
                plan.add_pull_request_number_to_active_task(pr.number)?;
                update.extend(state::task_plan_update(&plan));
            }
            info!(pr = pr.number, "pull request opened");
        }
    }

    if let Some(call) = call {
        update.extend(state::internal_message_update(&[Message::tool(
            "Pull request handled.",
            call.id,
        )]));
    }
    Ok(NodeOutcome::Update(update))
}

/// Launch the reviewer while budget remains; otherwise conclude.
async fn route_to_review_or_conclusion(
    deps: AgentDeps,
    state: StateMap,
    ctx: RunContext,
) -> Result<NodeOutcome> {
    let reviews = state::reviews_count(&state);
    if reviews >= deps.config.max_review_count || deps.config.local_mode {
        return Ok(NodeOutcome::Command(
            Command::new().with_goto("generate-conclusion"),
        ));
    }

    let reviewer_thread = state::session_ref(&state, keys::REVIEWER_SESSION)
        .map(|session| session.thread_id)
        .unwrap_or_else(Uuid::new_v4);

    let mut initial = StateMap::new();
    for key in [
        keys::TARGET_REPOSITORY,
        keys::GITHUB_ISSUE_ID,
        keys::BRANCH_NAME,
        keys::SANDBOX_SESSION_ID,
        keys::TASK_PLAN,
        keys::CODEBASE_TREE,
    ] {
        if let Some(value) = state.get(key) {
            if !value.is_null() {
                initial.insert(key.into(), value.clone());
            }
        }
    }
    initial.insert(
        keys::PROGRAMMER_SESSION.into(),
        serde_json::to_value(SessionRef {
            thread_id: ctx.thread_id,
            run_id: ctx.run_id,
        })?,
    );

    let handle = ctx
        .start_run(
            StartRun::new(REVIEWER_GRAPH_ID)
                .on_thread(reviewer_thread)
                .with_update(initial),
        )
        .await?;

    info!(review = reviews + 1, thread = %handle.thread_id, "reviewer launched");
    let mut update = StateMap::new();
    update.insert(keys::REVIEWS_COUNT.into(), json!(reviews + 1));
    update.insert(
        keys::REVIEWER_SESSION.into(),
        serde_json::to_value(SessionRef {
            thread_id: handle.thread_id,
            run_id: handle.run_id,
        })?,
    );
    Ok(NodeOutcome::Command(Command {
        update: Some(update),
        goto: Some(Goto::End),
    }))
}

/// Summarize the finished work, complete the task, and report back.
async fn generate_conclusion(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let mut transcript = String::new();
    for message in state::internal_messages(&state).iter().rev().take(40).rev() {
        transcript.push_str(&format!("[{:?}] {}\n", message.role, message.content));
    }

    let request = ChatRequest::new(vec![
        Message::system(
            "Summarize the completed work for the user: what changed, how it was verified, \
             and anything left open. Three short paragraphs at most.",
        ),
        Message::human(transcript),
    ]);
    let response = deps.router.chat(TaskClass::Summarizer, request).await?;
    let conclusion = response.message.content;

    let mut update = StateMap::new();
    let mut plan = state::task_plan(&state);
    if let Some(plan) = plan.as_mut() {
        if let Some(task) = plan.active_task().cloned() {
            if !task.completed {
                plan.complete_task(&task.id, conclusion.clone())?;
            }
        }
        update.extend(state::task_plan_update(plan));
    }

    if !deps.config.local_mode {
        if let (Ok(repo), Some(issue_id)) = (
            require_repository(&state),
            state::github_issue_id(&state),
        ) {
            let comment = format!("🤖 Done. {conclusion}");
            if let Err(e) = deps
                .scm
                .create_issue_comment(&repo, issue_id, &comment)
                .await
            {
                warn!(error = %e, "failed to post conclusion comment");
            }
            // Keep the embedded plan in sync with the final state.
            if let (Some(plan), Ok(issue)) = (plan.as_ref(), deps.scm.get_issue(&repo, issue_id).await)
            {
                let body = upsert_issue_plan(&issue.body, plan);
                let _ = deps.scm.update_issue_body(&repo, issue_id, &body).await;
            }
        }
    }

    let reply = Message::ai(conclusion);
    update.extend(state::message_update(&reply));
    Ok(NodeOutcome::Update(update))
}

fn upsert_issue_plan(body: &str, plan: &crate::plan::TaskPlan) -> String {
    crate::issue_format::upsert_agent_context(body, Some(plan), None)
}
