//! Manager graph: issue intake, classification, and planner dispatch
//!
//! `initialize-issue -> classify-message -> {start-planner |
//! create-new-session | END}`. The classifier's route also selects the
//! behavior inside `start-planner` (start, update, or resume the child).

use crate::classify::{
    available_routes, classification_prompt, classification_spec, Classification, ManagerRoute,
};
use crate::error::{OrchestratorError, Result};
use crate::graphs::{
    latest_human_message, require_issue_id, require_repository, AgentDeps, PLANNER_GRAPH_ID,
};
use crate::issue_format::{extract_task_plan, format_issue_message, render_new_issue_message};
use crate::state::{self, keys, kwargs, SessionRef};
use graph_core::{
    Command, Goto, GraphBuilder, Message, NodeOutcome, RunContext, StartRun,
    StateMap, END, START,
};
use llm::{structured_call, StructuredSpec, TaskClass};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// Build the manager graph.
pub fn build(deps: AgentDeps) -> Result<graph_core::Graph> {
    let schema = state::thread_schema();

    let d1 = deps.clone();
    let d2 = deps.clone();
    let d3 = deps.clone();
    let d4 = deps;

    let graph = GraphBuilder::new(crate::graphs::MANAGER_GRAPH_ID, schema)
        .add_node("initialize-issue", move |state, _ctx| {
            let deps = d1.clone();
            Box::pin(async move {
                initialize_issue(deps, state)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node_with_ends(
            "classify-message",
            vec!["start-planner", "create-new-session", END],
            move |state, _ctx| {
                let deps = d2.clone();
                Box::pin(async move {
                    classify_message(deps, state)
                        .await
                        .map_err(graph_core::GraphError::from)
                })
            },
        )
        .add_node("start-planner", move |state, ctx| {
            let deps = d3.clone();
            Box::pin(async move {
                start_planner(deps, state, ctx)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_node("create-new-session", move |state, ctx| {
            let deps = d4.clone();
            Box::pin(async move {
                create_new_session(deps, state, ctx)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_edge(START, "initialize-issue")
        .add_edge("initialize-issue", "classify-message")
        .add_edge("start-planner", END)
        .add_edge("create-new-session", END)
        .compile()?;

    Ok(graph)
}

/// Load the issue into the conversation, or refresh the embedded plan.
async fn initialize_issue(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let repo = require_repository(&state)?;

    // Follow-up turns (and local mode) only refresh the embedded plan.
    if deps.config.local_mode || state::has_user_message(&state) {
        if !deps.config.local_mode {
            if let Some(issue_id) = state::github_issue_id(&state) {
                let issue = deps
                    .scm
                    .get_issue(&repo, issue_id)
                    .await
                    .map_err(|e| OrchestratorError::External(e.to_string()))?;
                if let Some(plan) = extract_task_plan(&issue.body) {
                    return Ok(NodeOutcome::Update(state::task_plan_update(&plan)));
                }
            }
        }
        return Ok(NodeOutcome::empty());
    }

    let issue_id = require_issue_id(&state)?;
    let issue = deps
        .scm
        .get_issue(&repo, issue_id)
        .await
        .map_err(|e| OrchestratorError::External(e.to_string()))?;

    let message = Message::human(format_issue_message(&issue.title, &issue.body))
        .with_kwarg(kwargs::IS_ORIGINAL_ISSUE, json!(true))
        .with_kwarg(kwargs::GITHUB_ISSUE_ID, json!(issue_id))
        .with_kwarg(kwargs::REQUEST_SOURCE, json!(kwargs::SOURCE_ISSUE_WEBHOOK));

    let mut update = state::message_update(&message);
    if let Some(plan) = extract_task_plan(&issue.body) {
        update.extend(state::task_plan_update(&plan));
    }
    if let Some(options) = deps.config.trigger_from_labels(&issue.labels) {
        update.insert(keys::AUTO_ACCEPT_PLAN.into(), json!(options.auto_accept_plan));
    }
    if state::branch_name(&state).is_none() {
        update.insert(
            keys::BRANCH_NAME.into(),
            json!(deps.config.branch_name_for_issue(issue_id)),
        );
    }

    info!(issue = issue_id, "initialized manager thread from issue");
    Ok(NodeOutcome::Update(update))
}

/// Classify the latest message and route.
async fn classify_message(deps: AgentDeps, state: StateMap) -> Result<NodeOutcome> {
    let planner_status = deps.session_status(&state, keys::PLANNER_SESSION).await;
    let programmer_status = deps.session_status(&state, keys::PROGRAMMER_SESSION).await;
    let routes = available_routes(planner_status, programmer_status);

    let mut prompt_messages = vec![Message::system(classification_prompt(&routes))];
    prompt_messages.extend(state::messages(&state));

    let value = structured_call(
        &deps.router,
        TaskClass::Router,
        prompt_messages,
        &classification_spec(&routes),
    )
    .await?;
    let classification: Classification = serde_json::from_value(value)?;
    let route = classification.route().ok_or_else(|| {
        OrchestratorError::Validation(format!("classifier chose unknown route {}", classification.route))
    })?;

    info!(route = route.as_str(), "classified incoming message");

    let reply = Message::ai(classification.response.clone());
    let mut update = state::message_update(&reply);
    update.insert(keys::MANAGER_ROUTE.into(), json!(route.as_str()));

    let goto = match route {
        ManagerRoute::NoOp => Goto::End,
        ManagerRoute::CreateNewIssue => Goto::Node("create-new-session".into()),
        _ => Goto::Node("start-planner".into()),
    };
    Ok(NodeOutcome::Command(Command {
        update: Some(update),
        goto: Some(goto),
    }))
}

/// Start, update, or resume the planner (or forward to the programmer).
async fn start_planner(deps: AgentDeps, state: StateMap, ctx: RunContext) -> Result<NodeOutcome> {
    let route = state::string_field(&state, keys::MANAGER_ROUTE)
        .and_then(|raw| ManagerRoute::from_str(&raw))
        .unwrap_or(ManagerRoute::StartPlanner);

    match route {
        ManagerRoute::UpdatePlanner => {
            forward_latest_message(&deps, &state, keys::PLANNER_SESSION).await
        }
        ManagerRoute::UpdateProgrammer => {
            forward_latest_message(&deps, &state, keys::PROGRAMMER_SESSION).await
        }
        ManagerRoute::ResumeAndUpdatePlanner => resume_planner(&deps, &state, &ctx).await,
        _ => launch_planner(&deps, &state, &ctx).await,
    }
}

async fn forward_latest_message(
    deps: &AgentDeps,
    state: &StateMap,
    session_key: &str,
) -> Result<NodeOutcome> {
    let session = state::session_ref(state, session_key).ok_or_else(|| {
        OrchestratorError::Validation(format!("no child session under {session_key}"))
    })?;
    let message = latest_human_message(state).ok_or_else(|| {
        OrchestratorError::Validation("no user message to forward".into())
    })?;

    deps.append_message_to_thread(session.thread_id, &message).await?;
    info!(thread = %session.thread_id, "forwarded update to child thread");
    Ok(NodeOutcome::empty())
}

async fn resume_planner(
    deps: &AgentDeps,
    state: &StateMap,
    ctx: &RunContext,
) -> Result<NodeOutcome> {
    let session = state::session_ref(state, keys::PLANNER_SESSION)
        .ok_or_else(|| OrchestratorError::Validation("no planner session to resume".into()))?;
    let snapshot = deps.store.get(session.thread_id).await?;

    let Some(interrupt) = snapshot.pending_interrupt.clone() else {
        // Interrupt already answered elsewhere; degrade to an update.
        warn!(thread = %session.thread_id, "planner no longer interrupted, forwarding message");
        return forward_latest_message(deps, state, keys::PLANNER_SESSION).await;
    };

    let response = latest_human_message(state)
        .map(|m| m.content)
        .unwrap_or_default();
    deps.store
        .resume(
            session.thread_id,
            json!({ "type": "response", "response": response }),
        )
        .await?;

    let handle = ctx
        .start_run(
            StartRun::new(interrupt.graph_id.clone())
                .on_thread(session.thread_id)
                .at_node(interrupt.node.clone()),
        )
        .await?;

    let mut update = StateMap::new();
    update.insert(
        keys::PLANNER_SESSION.into(),
        serde_json::to_value(SessionRef {
            thread_id: handle.thread_id,
            run_id: handle.run_id,
        })?,
    );
    Ok(NodeOutcome::Update(update))
}

async fn launch_planner(
    deps: &AgentDeps,
    state: &StateMap,
    ctx: &RunContext,
) -> Result<NodeOutcome> {
    let repo = require_repository(state)?;
    let issue_id = state::github_issue_id(state);

    // A fresh installation token before handing off, unless a PAT is in use.
    if !deps.config.local_mode && deps.config.github_pat.is_none() {
        deps.scm
            .refresh_token()
            .await
            .map_err(|e| OrchestratorError::External(e.to_string()))?;
    }

    let thread_id = state::session_ref(state, keys::PLANNER_SESSION)
        .map(|session| session.thread_id)
        .unwrap_or_else(Uuid::new_v4);

    let mut initial = StateMap::new();
    initial.insert(keys::TARGET_REPOSITORY.into(), serde_json::to_value(&repo)?);
    if let Some(issue_id) = issue_id {
        initial.insert(keys::GITHUB_ISSUE_ID.into(), json!(issue_id));
    }
    if let Some(plan) = state::task_plan(state) {
        initial.extend(state::task_plan_update(&plan));
    }
    if let Some(branch) = state::branch_name(state) {
        initial.insert(keys::BRANCH_NAME.into(), json!(branch));
    }
    initial.insert(
        keys::AUTO_ACCEPT_PLAN.into(),
        json!(state::auto_accept_plan(state)),
    );
    // Carries the PR-review trigger along so the programmer binds the
    // reply tools on review-triggered sessions.
    initial.insert(
        keys::REVIEW_TRIGGER.into(),
        json!(state::review_triggered(state)),
    );

    // Local mode and follow-ups carry the triggering message along; the
    // planner re-reads the original issue itself otherwise.
    if let Some(message) = latest_human_message(state) {
        if deps.config.local_mode || !message.kwarg_flag(kwargs::IS_ORIGINAL_ISSUE) {
            initial.extend(state::message_update(&message));
        }
    }

    let handle = ctx
        .start_run(
            StartRun::new(PLANNER_GRAPH_ID)
                .on_thread(thread_id)
                .with_update(initial),
        )
        .await?;
    let session = SessionRef {
        thread_id: handle.thread_id,
        run_id: handle.run_id,
    };
    info!(thread = %session.thread_id, run = %session.run_id, "planner launched");

    // Let watchers on the issue know the agent picked it up.
    if let Some(issue_id) = issue_id {
        if !deps.config.local_mode {
            let body = format!(
                "🤖 {} is working on this issue. Follow along: {}/threads/{}",
                deps.config.app_name, deps.config.app_url, session.thread_id
            );
            if let Err(e) = deps.scm.create_issue_comment(&repo, issue_id, &body).await {
                warn!(error = %e, "failed to comment on issue");
            }
        }
    }

    let mut update = StateMap::new();
    update.insert(keys::PLANNER_SESSION.into(), serde_json::to_value(session)?);
    Ok(NodeOutcome::Update(update))
}

fn new_issue_spec() -> StructuredSpec {
    StructuredSpec::new(
        "derive_issue",
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["title", "content"]
        }),
    )
}

/// Fork an unrelated request into a new issue and manager session.
async fn create_new_session(
    deps: AgentDeps,
    state: StateMap,
    ctx: RunContext,
) -> Result<NodeOutcome> {
    let repo = require_repository(&state)?;

    let mut prompt_messages = vec![Message::system(
        "Derive a concise issue title and body for the user's latest, unrelated request.",
    )];
    prompt_messages.extend(state::messages(&state));
    let value = structured_call(
        &deps.router,
        TaskClass::Router,
        prompt_messages,
        &new_issue_spec(),
    )
    .await?;
    let title = value["title"].as_str().unwrap_or("Follow-up request").to_string();
    let content = value["content"].as_str().unwrap_or("").to_string();

    let label = deps.config.trigger_labels().remove(0);
    let issue = deps
        .scm
        .create_issue(&repo, &title, &content, &[label])
        .await
        .map_err(|e| OrchestratorError::External(e.to_string()))?;

    // Seed the new manager thread directly at planner dispatch. The seed
    // message uses the inter-graph handoff format so the receiving side
    // can recover title and body without refetching.
    let new_thread = Uuid::new_v4();
    let seed_human = Message::human(render_new_issue_message(&title, &content))
        .with_kwarg(kwargs::IS_ORIGINAL_ISSUE, json!(true))
        .with_kwarg(kwargs::GITHUB_ISSUE_ID, json!(issue.number));
    let seed_ai = Message::ai(format!(
        "Opened issue #{} for this request; starting a new session.",
        issue.number
    ));

    let mut initial = StateMap::new();
    initial.insert(keys::TARGET_REPOSITORY.into(), serde_json::to_value(&repo)?);
    initial.insert(keys::GITHUB_ISSUE_ID.into(), json!(issue.number));
    initial.insert(
        keys::BRANCH_NAME.into(),
        json!(deps.config.branch_name_for_issue(issue.number)),
    );
    initial.insert(
        keys::MANAGER_ROUTE.into(),
        json!(ManagerRoute::StartPlanner.as_str()),
    );
    let seed_messages = serde_json::to_value(vec![seed_human, seed_ai])?;
    initial.insert(keys::MESSAGES.into(), seed_messages.clone());
    initial.insert(keys::INTERNAL_MESSAGES.into(), seed_messages);

    let handle = ctx
        .start_run(
            StartRun::new(crate::graphs::MANAGER_GRAPH_ID)
                .on_thread(new_thread)
                .at_node("start-planner")
                .with_update(initial),
        )
        .await?;

    info!(issue = issue.number, thread = %handle.thread_id, "created parallel session");

    let reply = Message::ai(format!(
        "Created issue #{} and a new session to handle it (thread {}).",
        issue.number, handle.thread_id
    ));
    Ok(NodeOutcome::Command(Command {
        update: Some(state::message_update(&reply)),
        goto: Some(Goto::End),
    }))
}
