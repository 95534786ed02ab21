//! Task plans with revision history
//!
//! A [`TaskPlan`] maps a request to an ordered set of [`Task`]s; each task
//! carries a history of [`PlanRevision`]s whose [`PlanItem`]s are the
//! executable directives. Revisions are immutable once recorded: plan
//! updates append a new revision, and completed items can never change
//! text, only carry forward.
//!
//! Invariants maintained here:
//!
//! 1. `active_task_index` points into `tasks` whenever tasks exist
//! 2. every task's `active_revision_index` points into its revisions
//! 3. item indices within a revision are dense starting at 0
//! 4. a completed item's `plan` text never changes in later revisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Who recorded a plan revision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanAuthor {
    Agent,
    User,
}

/// One executable directive within a revision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanItem {
    /// Execution order; dense within a revision
    pub index: usize,

    /// The directive text; immutable once the item completes
    pub plan: String,

    pub completed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl PlanItem {
    fn new(index: usize, plan: impl Into<String>) -> Self {
        Self {
            index,
            plan: plan.into(),
            completed: false,
            summary: None,
        }
    }
}

/// An immutable snapshot of the plan at one point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanRevision {
    pub revision_index: usize,
    pub plans: Vec<PlanItem>,
    pub created_at: DateTime<Utc>,
    pub created_by: PlanAuthor,
}

/// A single coherent unit of work for the user's request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,

    /// Creation order within the plan
    pub task_index: usize,

    /// The user's original prose request
    pub request: String,

    pub title: String,
    pub created_at: DateTime<Utc>,
    pub completed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_number: Option<u64>,

    pub plan_revisions: Vec<PlanRevision>,
    pub active_revision_index: usize,
}

impl Task {
    pub fn active_revision(&self) -> Option<&PlanRevision> {
        self.plan_revisions.get(self.active_revision_index)
    }

    fn active_revision_mut(&mut self) -> Option<&mut PlanRevision> {
        self.plan_revisions.get_mut(self.active_revision_index)
    }

    /// Items of the active revision not yet completed, in order.
    pub fn remaining_items(&self) -> Vec<&PlanItem> {
        self.active_revision()
            .map(|revision| revision.plans.iter().filter(|item| !item.completed).collect())
            .unwrap_or_default()
    }

    /// First incomplete item of the active revision.
    pub fn current_item(&self) -> Option<&PlanItem> {
        self.active_revision()?
            .plans
            .iter()
            .find(|item| !item.completed)
    }
}

/// Mapping of a request to an ordered set of tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPlan {
    pub tasks: Vec<Task>,
    pub active_task_index: usize,
}

impl TaskPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.tasks.get(self.active_task_index)
    }

    pub fn active_task_mut(&mut self) -> Option<&mut Task> {
        self.tasks.get_mut(self.active_task_index)
    }

    pub fn task_by_id(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    fn task_by_id_mut(&mut self, task_id: &str) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| OrchestratorError::Validation(format!("unknown task id {task_id}")))
    }

    /// Append a new task with one initial revision and make it active.
    pub fn create_task(
        &mut self,
        request: impl Into<String>,
        title: impl Into<String>,
        plan_items: Vec<String>,
        parent_task_id: Option<String>,
    ) -> &Task {
        let task_index = self.tasks.len();
        let plans = plan_items
            .into_iter()
            .enumerate()
            .map(|(index, plan)| PlanItem::new(index, plan))
            .collect();

        let task = Task {
            id: Uuid::new_v4().to_string(),
            task_index,
            request: request.into(),
            title: title.into(),
            created_at: Utc::now(),
            completed: false,
            completed_at: None,
            summary: None,
            parent_task_id,
            pull_request_number: None,
            plan_revisions: vec![PlanRevision {
                revision_index: 0,
                plans,
                created_at: Utc::now(),
                created_by: PlanAuthor::Agent,
            }],
            active_revision_index: 0,
        };

        self.tasks.push(task);
        self.active_task_index = task_index;
        // Just pushed at task_index.
        &self.tasks[task_index]
    }

    /// Record a new revision for a task.
    ///
    /// Completed items from the current revision are preserved at their
    /// index positions; `new_items` fill the remaining indices in order.
    /// An update that would drop (and thereby mutate) a completed item is
    /// rejected.
    pub fn update_plan_items(
        &mut self,
        task_id: &str,
        new_items: Vec<String>,
        created_by: PlanAuthor,
    ) -> Result<()> {
        let task = self.task_by_id_mut(task_id)?;
        let current = task
            .active_revision()
            .ok_or_else(|| OrchestratorError::PlanUpdate("task has no revisions".into()))?;

        let completed: Vec<PlanItem> = current
            .plans
            .iter()
            .filter(|item| item.completed)
            .cloned()
            .collect();

        let total = completed.len() + new_items.len();
        if let Some(max_completed) = completed.iter().map(|item| item.index).max() {
            if max_completed >= total {
                return Err(OrchestratorError::PlanUpdate(format!(
                    "update would drop completed item at index {max_completed}"
                )));
            }
        }

        let mut plans: Vec<PlanItem> = Vec::with_capacity(total);
        let mut pending = new_items.into_iter();
        for index in 0..total {
            if let Some(done) = completed.iter().find(|item| item.index == index) {
                plans.push(done.clone());
            } else if let Some(plan) = pending.next() {
                plans.push(PlanItem::new(index, plan));
            }
        }

        let revision_index = task.plan_revisions.len();
        task.plan_revisions.push(PlanRevision {
            revision_index,
            plans,
            created_at: Utc::now(),
            created_by,
        });
        task.active_revision_index = revision_index;
        Ok(())
    }

    /// Mark one item of the active revision completed, in place.
    ///
    /// Does not create a new revision.
    pub fn complete_plan_item(
        &mut self,
        task_id: &str,
        item_index: usize,
        summary: impl Into<String>,
    ) -> Result<()> {
        let task = self.task_by_id_mut(task_id)?;
        let revision = task
            .active_revision_mut()
            .ok_or_else(|| OrchestratorError::PlanUpdate("task has no revisions".into()))?;
        let item = revision
            .plans
            .iter_mut()
            .find(|item| item.index == item_index)
            .ok_or_else(|| {
                OrchestratorError::Validation(format!("no plan item at index {item_index}"))
            })?;

        item.completed = true;
        item.summary = Some(summary.into());
        Ok(())
    }

    /// Mark a task completed with a summary.
    pub fn complete_task(&mut self, task_id: &str, summary: impl Into<String>) -> Result<()> {
        let task = self.task_by_id_mut(task_id)?;
        task.completed = true;
        task.completed_at = Some(Utc::now());
        task.summary = Some(summary.into());
        Ok(())
    }

    /// Record the PR opened for the currently active task.
    pub fn add_pull_request_number_to_active_task(&mut self, number: u64) -> Result<()> {
        let task = self
            .active_task_mut()
            .ok_or_else(|| OrchestratorError::Validation("no active task".into()))?;
        task.pull_request_number = Some(number);
        Ok(())
    }

    /// Remaining items of the active task.
    pub fn remaining_plan_items(&self) -> Vec<&PlanItem> {
        self.active_task()
            .map(Task::remaining_items)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with_items(items: &[&str]) -> (TaskPlan, String) {
        let mut plan = TaskPlan::new();
        let task_id = plan
            .create_task(
                "fix the bug",
                "Fix bug",
                items.iter().map(|s| s.to_string()).collect(),
                None,
            )
            .id
            .clone();
        (plan, task_id)
    }

    #[test]
    fn create_task_activates_and_indexes_densely() {
        let (plan, _) = plan_with_items(&["a", "b", "c"]);

        assert_eq!(plan.active_task_index, 0);
        let revision = plan.active_task().unwrap().active_revision().unwrap();
        let indices: Vec<usize> = revision.plans.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn second_task_becomes_active() {
        let (mut plan, _) = plan_with_items(&["a"]);
        plan.create_task("follow-up", "Followup", vec!["x".into()], None);

        assert_eq!(plan.active_task_index, 1);
        assert!(plan.active_task_index < plan.tasks.len());
    }

    #[test]
    fn complete_item_is_in_place_without_new_revision() {
        let (mut plan, task_id) = plan_with_items(&["a", "b"]);
        plan.complete_plan_item(&task_id, 0, "did a").unwrap();

        let task = plan.task_by_id(&task_id).unwrap();
        assert_eq!(task.plan_revisions.len(), 1);
        assert!(task.active_revision().unwrap().plans[0].completed);
        assert_eq!(
            task.active_revision().unwrap().plans[0].summary.as_deref(),
            Some("did a")
        );
        assert_eq!(task.remaining_items().len(), 1);
    }

    #[test]
    fn update_preserves_completed_items_at_their_indices() {
        let (mut plan, task_id) = plan_with_items(&["a", "b", "c"]);
        plan.complete_plan_item(&task_id, 0, "done a").unwrap();

        plan.update_plan_items(
            &task_id,
            vec!["b revised".into(), "d new".into()],
            PlanAuthor::User,
        )
        .unwrap();

        let task = plan.task_by_id(&task_id).unwrap();
        assert_eq!(task.plan_revisions.len(), 2);
        assert_eq!(task.active_revision_index, 1);

        let items = &task.active_revision().unwrap().plans;
        assert_eq!(items.len(), 3);
        // Completed item carried forward unchanged at index 0.
        assert_eq!(items[0].plan, "a");
        assert!(items[0].completed);
        assert_eq!(items[1].plan, "b revised");
        assert_eq!(items[2].plan, "d new");
        // Dense indices.
        let indices: Vec<usize> = items.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn earlier_revisions_are_never_mutated() {
        let (mut plan, task_id) = plan_with_items(&["a", "b"]);
        let original = plan
            .task_by_id(&task_id)
            .unwrap()
            .active_revision()
            .unwrap()
            .clone();

        plan.update_plan_items(&task_id, vec!["z".into()], PlanAuthor::Agent)
            .unwrap();

        let task = plan.task_by_id(&task_id).unwrap();
        assert_eq!(task.plan_revisions[0], original);
        assert!(task.active_revision_index < task.plan_revisions.len());
    }

    #[test]
    fn update_dropping_a_completed_item_is_rejected() {
        let (mut plan, task_id) = plan_with_items(&["a", "b", "c"]);
        plan.complete_plan_item(&task_id, 2, "done c").unwrap();

        // One new item plus one completed item = 2 slots, but the completed
        // item sits at index 2. The update would have to move or drop it.
        let err = plan
            .update_plan_items(&task_id, vec!["only one".into()], PlanAuthor::Agent)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PlanUpdate(_)));
    }

    #[test]
    fn complete_task_records_summary_and_time() {
        let (mut plan, task_id) = plan_with_items(&["a"]);
        plan.complete_task(&task_id, "all done").unwrap();

        let task = plan.task_by_id(&task_id).unwrap();
        assert!(task.completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.summary.as_deref(), Some("all done"));
    }

    #[test]
    fn pull_request_lands_on_active_task() {
        let (mut plan, _) = plan_with_items(&["a"]);
        plan.create_task("second", "Second", vec!["x".into()], None);
        plan.add_pull_request_number_to_active_task(77).unwrap();

        assert_eq!(plan.tasks[1].pull_request_number, Some(77));
        assert_eq!(plan.tasks[0].pull_request_number, None);
    }

    #[test]
    fn remaining_items_empty_after_all_complete() {
        let (mut plan, task_id) = plan_with_items(&["a", "b"]);
        plan.complete_plan_item(&task_id, 0, "s0").unwrap();
        plan.complete_plan_item(&task_id, 1, "s1").unwrap();
        assert!(plan.remaining_plan_items().is_empty());
    }

    #[test]
    fn serde_roundtrip_preserves_structure() {
        let (mut plan, task_id) = plan_with_items(&["a", "b"]);
        plan.complete_plan_item(&task_id, 0, "done").unwrap();

        let json = serde_json::to_string(&plan).unwrap();
        let back: TaskPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
