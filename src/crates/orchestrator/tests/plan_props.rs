//! Property tests: task-plan invariants and the issue-body round trip

use orchestrator::issue_format::{extract_task_plan, upsert_agent_context};
use orchestrator::plan::{PlanAuthor, TaskPlan};
use proptest::prelude::*;

fn item_text() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9 ,.]{0,40}".prop_map(String::from)
}

#[derive(Debug, Clone)]
struct PlanScript {
    tasks: Vec<TaskScript>,
}

#[derive(Debug, Clone)]
struct TaskScript {
    title: String,
    items: Vec<String>,
    complete_prefix: usize,
    revision: Option<Vec<String>>,
}

fn task_script() -> impl Strategy<Value = TaskScript> {
    (
        item_text(),
        prop::collection::vec(item_text(), 1..5),
        0usize..5,
        prop::option::of(prop::collection::vec(item_text(), 1..4)),
    )
        .prop_map(|(title, items, complete_prefix, revision)| TaskScript {
            title,
            complete_prefix: complete_prefix.min(items.len()),
            items,
            revision,
        })
}

fn plan_script() -> impl Strategy<Value = PlanScript> {
    prop::collection::vec(task_script(), 1..4).prop_map(|tasks| PlanScript { tasks })
}

/// Build a plan through the public operations so every invariant the
/// operations maintain holds by construction.
fn build_plan(script: &PlanScript) -> TaskPlan {
    let mut plan = TaskPlan::new();
    for task_script in &script.tasks {
        let task_id = plan
            .create_task(
                format!("request: {}", task_script.title),
                task_script.title.clone(),
                task_script.items.clone(),
                None,
            )
            .id
            .clone();

        // Completing a prefix keeps revisions applicable afterwards.
        for index in 0..task_script.complete_prefix {
            plan.complete_plan_item(&task_id, index, format!("done {index}"))
                .unwrap();
        }
        if let Some(new_items) = &task_script.revision {
            plan.update_plan_items(&task_id, new_items.clone(), PlanAuthor::User)
                .unwrap();
        }
    }
    plan
}

proptest! {
    #[test]
    fn issue_body_roundtrip_preserves_the_plan(script in plan_script(), prose in "[a-zA-Z .\n]{0,80}") {
        let plan = build_plan(&script);
        let body = upsert_agent_context(&prose, Some(&plan), None);
        let parsed = extract_task_plan(&body).expect("plan parses back");
        prop_assert_eq!(parsed, plan);
    }

    #[test]
    fn active_indices_stay_in_bounds(script in plan_script()) {
        let plan = build_plan(&script);
        prop_assert!(!plan.tasks.is_empty());
        prop_assert!(plan.active_task_index < plan.tasks.len());
        for task in &plan.tasks {
            prop_assert!(task.active_revision_index < task.plan_revisions.len());
        }
    }

    #[test]
    fn item_indices_are_dense(script in plan_script()) {
        let plan = build_plan(&script);
        for task in &plan.tasks {
            for revision in &task.plan_revisions {
                for (position, item) in revision.plans.iter().enumerate() {
                    prop_assert_eq!(item.index, position);
                }
            }
        }
    }

    #[test]
    fn completed_item_text_survives_revisions(script in plan_script()) {
        let plan = build_plan(&script);
        for task in &plan.tasks {
            // Any item completed in an earlier revision keeps its text in
            // every later revision that carries its index.
            for (revision_index, revision) in task.plan_revisions.iter().enumerate() {
                for item in revision.plans.iter().filter(|item| item.completed) {
                    for later in &task.plan_revisions[revision_index + 1..] {
                        if let Some(carried) = later.plans.iter().find(|p| p.index == item.index) {
                            prop_assert_eq!(&carried.plan, &item.plan);
                            prop_assert!(carried.completed);
                        }
                    }
                }
            }
        }
    }
}
