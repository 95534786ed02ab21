//! Reviewer graph: judge the change, loop back or conclude
//!
//! A single `review` node: diff the work branch, ask the review model for
//! a verdict, then either send the programmer back with feedback or route
//! it straight to its conclusion. The reviewer never blocks the
//! programmer; both communicate only through thread state and new runs.

use crate::error::{OrchestratorError, Result};
use crate::graphs::{AgentDeps, PROGRAMMER_GRAPH_ID};
use crate::state::{self, keys};
use graph_core::{
    ChatRequest, Command, GraphBuilder, Message, NodeOutcome, RunContext, StartRun, StateMap,
    END, START,
};
use llm::{structured_call, StructuredSpec, TaskClass};
use sandbox::ExecRequest;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

/// Cap on the diff excerpt handed to the review model, in characters
const MAX_DIFF_CHARS: usize = 40_000;

fn review_spec() -> StructuredSpec {
    StructuredSpec::new(
        "review_verdict",
        json!({
            "type": "object",
            "properties": {
                "approved": { "type": "boolean" },
                "feedback": {
                    "type": "string",
                    "description": "Actionable feedback when not approved; brief praise otherwise"
                }
            },
            "required": ["approved", "feedback"]
        }),
    )
}

/// Build the reviewer graph.
pub fn build(deps: AgentDeps) -> Result<graph_core::Graph> {
    let schema = state::thread_schema();
    let graph = GraphBuilder::new(crate::graphs::REVIEWER_GRAPH_ID, schema)
        .add_node("review", move |state, ctx| {
            let deps = deps.clone();
            Box::pin(async move {
                review(deps, state, ctx)
                    .await
                    .map_err(graph_core::GraphError::from)
            })
        })
        .add_edge(START, "review")
        .add_edge("review", END)
        .compile()?;
    Ok(graph)
}

/// Fetch the diff of the work branch against its base.
async fn work_diff(deps: &AgentDeps, state: &StateMap) -> Result<String> {
    let backend = deps.backend(state)?;
    let repo = crate::graphs::require_repository(state)?;
    let base = repo.base_branch.clone().unwrap_or_else(|| "main".to_string());

    let output = backend
        .run(
            ExecRequest::new([
                "git",
                "diff",
                &format!("origin/{base}...HEAD"),
            ])
            .with_timeout(Duration::from_secs(60)),
        )
        .await?;

    let mut diff = if output.is_success() && !output.stdout.trim().is_empty() {
        output.stdout
    } else {
        // Fall back to the working tree when the range diff is empty or
        // the base ref is unknown locally.
        backend
            .run(ExecRequest::new(["git", "diff"]).with_timeout(Duration::from_secs(60)))
            .await?
            .stdout
    };

    if diff.chars().count() > MAX_DIFF_CHARS {
        diff = diff.chars().take(MAX_DIFF_CHARS).collect();
        diff.push_str("\n... (truncated)");
    }
    Ok(diff)
}

/// Judge the change and dispatch the programmer accordingly.
async fn review(deps: AgentDeps, state: StateMap, ctx: RunContext) -> Result<NodeOutcome> {
    let programmer = state::session_ref(&state, keys::PROGRAMMER_SESSION).ok_or_else(|| {
        OrchestratorError::Validation("reviewer started without a programmer session".into())
    })?;

    let diff = work_diff(&deps, &state).await?;
    let plan_context = state::task_plan(&state)
        .and_then(|plan| plan.active_task().cloned())
        .map(|task| {
            let items: Vec<String> = task
                .active_revision()
                .map(|revision| {
                    revision
                        .plans
                        .iter()
                        .map(|item| format!("{}. {}", item.index + 1, item.plan))
                        .collect()
                })
                .unwrap_or_default();
            format!("Task: {}\nPlan:\n{}", task.title, items.join("\n"))
        })
        .unwrap_or_default();

    let messages = vec![
        Message::system(
            "Review the following change against its plan. Approve only when the change is \
             complete, correct, and consistent with the repository's conventions.",
        ),
        Message::human(format!("{plan_context}\n\nDiff:\n```diff\n{diff}\n```")),
    ];
    let value = structured_call(&deps.router, TaskClass::Planner, messages, &review_spec()).await?;

    let approved = value["approved"].as_bool().unwrap_or(false);
    let feedback = value["feedback"].as_str().unwrap_or("").to_string();
    info!(approved, "review verdict");

    if approved {
        ctx.start_run(
            StartRun::new(PROGRAMMER_GRAPH_ID)
                .on_thread(programmer.thread_id)
                .at_node("generate-conclusion"),
        )
        .await?;
    } else {
        let feedback_message = Message::human(format!(
            "Review feedback (address before concluding):\n{feedback}"
        ));
        ctx.start_run(
            StartRun::new(PROGRAMMER_GRAPH_ID)
                .on_thread(programmer.thread_id)
                .at_node("generate-action")
                .with_update(state::message_update(&feedback_message)),
        )
        .await?;
    }

    let verdict = Message::ai(if approved {
        format!("Change approved. {feedback}")
    } else {
        format!("Changes requested. {feedback}")
    });
    let mut update = state::message_update(&verdict);
    update.insert("review_verdict".into(), Value::Bool(approved));
    Ok(NodeOutcome::Command(Command::end(update)))
}
