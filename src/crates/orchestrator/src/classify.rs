//! Manager request classification
//!
//! Incoming messages are routed by a structured model call whose enum of
//! route options depends on the current status of the planner and
//! programmer threads. The classifier can only ever pick a route that was
//! actually offered.

use graph_store::RunStatus;
use llm::StructuredSpec;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Routes the manager can take after classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManagerRoute {
    NoOp,
    StartPlanner,
    UpdatePlanner,
    ResumeAndUpdatePlanner,
    StartPlannerForFollowup,
    UpdateProgrammer,
    CreateNewIssue,
}

impl ManagerRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerRoute::NoOp => "no_op",
            ManagerRoute::StartPlanner => "start_planner",
            ManagerRoute::UpdatePlanner => "update_planner",
            ManagerRoute::ResumeAndUpdatePlanner => "resume_and_update_planner",
            ManagerRoute::StartPlannerForFollowup => "start_planner_for_followup",
            ManagerRoute::UpdateProgrammer => "update_programmer",
            ManagerRoute::CreateNewIssue => "create_new_issue",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "no_op" => Some(Self::NoOp),
            "start_planner" => Some(Self::StartPlanner),
            "update_planner" => Some(Self::UpdatePlanner),
            "resume_and_update_planner" => Some(Self::ResumeAndUpdatePlanner),
            "start_planner_for_followup" => Some(Self::StartPlannerForFollowup),
            "update_programmer" => Some(Self::UpdateProgrammer),
            "create_new_issue" => Some(Self::CreateNewIssue),
            _ => None,
        }
    }
}

/// Classifier output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub internal_reasoning: String,

    /// Reply surfaced to the user
    pub response: String,

    pub route: String,
}

impl Classification {
    pub fn route(&self) -> Option<ManagerRoute> {
        ManagerRoute::from_str(&self.route)
    }
}

/// Routes offered for the given planner/programmer statuses.
///
/// `no_op` is always available. The rest follow the status table: a fresh
/// planner can start; a busy one receives updates; an interrupted one is
/// resumed with the update; two idle agents take a follow-up; a busy
/// programmer receives updates; and once both agents have ever started, a
/// parallel session can fork into a new issue.
pub fn available_routes(planner: RunStatus, programmer: RunStatus) -> Vec<ManagerRoute> {
    let mut routes = vec![ManagerRoute::NoOp];

    match planner {
        RunStatus::NotStarted => routes.push(ManagerRoute::StartPlanner),
        RunStatus::Busy => routes.push(ManagerRoute::UpdatePlanner),
        RunStatus::Interrupted => routes.push(ManagerRoute::ResumeAndUpdatePlanner),
        RunStatus::Idle if programmer == RunStatus::Idle => {
            routes.push(ManagerRoute::StartPlannerForFollowup)
        }
        _ => {}
    }

    if programmer == RunStatus::Busy {
        routes.push(ManagerRoute::UpdateProgrammer);
    }

    if planner != RunStatus::NotStarted && programmer != RunStatus::NotStarted {
        routes.push(ManagerRoute::CreateNewIssue);
    }

    routes
}

/// Structured output spec whose route enum is exactly the offered set.
pub fn classification_spec(routes: &[ManagerRoute]) -> StructuredSpec {
    let options: Vec<&str> = routes.iter().map(ManagerRoute::as_str).collect();
    StructuredSpec::new(
        "classify_message",
        json!({
            "type": "object",
            "properties": {
                "internal_reasoning": {
                    "type": "string",
                    "description": "Step-by-step reasoning about the user's intent"
                },
                "response": {
                    "type": "string",
                    "description": "Short reply shown to the user"
                },
                "route": { "type": "string", "enum": options }
            },
            "required": ["internal_reasoning", "response", "route"]
        }),
    )
}

/// System prompt listing the currently available routes.
pub fn classification_prompt(routes: &[ManagerRoute]) -> String {
    let mut prompt = String::from(
        "You route incoming requests for a software-engineering agent. \
         Classify the latest user message and pick exactly one route.\n\nAvailable routes:\n",
    );
    for route in routes {
        let description = match route {
            ManagerRoute::NoOp => "nothing actionable; acknowledge and stop",
            ManagerRoute::StartPlanner => "begin planning for a new request",
            ManagerRoute::UpdatePlanner => "forward new information to the running planner",
            ManagerRoute::ResumeAndUpdatePlanner => {
                "answer the planner's pending question and continue"
            }
            ManagerRoute::StartPlannerForFollowup => {
                "start a follow-up planning session on the finished work"
            }
            ManagerRoute::UpdateProgrammer => "forward new information to the running programmer",
            ManagerRoute::CreateNewIssue => {
                "the request is unrelated; open a new issue and parallel session"
            }
        };
        prompt.push_str(&format!("- {}: {description}\n", route.as_str()));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_thread_offers_start_planner() {
        let routes = available_routes(RunStatus::NotStarted, RunStatus::NotStarted);
        assert!(routes.contains(&ManagerRoute::StartPlanner));
        assert!(routes.contains(&ManagerRoute::NoOp));
        assert!(!routes.contains(&ManagerRoute::CreateNewIssue));
    }

    #[test]
    fn busy_planner_offers_update() {
        let routes = available_routes(RunStatus::Busy, RunStatus::NotStarted);
        assert!(routes.contains(&ManagerRoute::UpdatePlanner));
        assert!(!routes.contains(&ManagerRoute::StartPlanner));
    }

    #[test]
    fn interrupted_planner_offers_resume() {
        let routes = available_routes(RunStatus::Interrupted, RunStatus::Idle);
        assert!(routes.contains(&ManagerRoute::ResumeAndUpdatePlanner));
        // Both have started: parallel sessions become possible.
        assert!(routes.contains(&ManagerRoute::CreateNewIssue));
    }

    #[test]
    fn both_idle_offers_followup() {
        let routes = available_routes(RunStatus::Idle, RunStatus::Idle);
        assert!(routes.contains(&ManagerRoute::StartPlannerForFollowup));
    }

    #[test]
    fn busy_programmer_offers_update_programmer() {
        let routes = available_routes(RunStatus::Idle, RunStatus::Busy);
        assert!(routes.contains(&ManagerRoute::UpdateProgrammer));
        assert!(!routes.contains(&ManagerRoute::StartPlannerForFollowup));
    }

    #[test]
    fn spec_enum_matches_offered_routes() {
        let routes = available_routes(RunStatus::NotStarted, RunStatus::NotStarted);
        let spec = classification_spec(&routes);
        let options = spec.schema["properties"]["route"]["enum"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(options.len(), routes.len());
        assert!(options.iter().any(|v| v == "start_planner"));
        assert!(!options.iter().any(|v| v == "update_programmer"));
    }
}
