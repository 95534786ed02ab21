//! # orchestrator
//!
//! The agent layer of patchwork: four composed graphs that turn a
//! source-control issue into a pull request.
//!
//! ```text
//!  Manager ──(classify)──► Planner ──► Programmer ──► Reviewer
//!                                          ▲              │
//!                                          └──(feedback)──┘
//! ```
//!
//! - **Manager** ([`graphs::manager`]) - issue intake, request
//!   classification against the live planner/programmer statuses, child
//!   dispatch, parallel-session forking
//! - **Planner** ([`graphs::planner`]) - sandbox acquisition, a
//!   tool-driven context-gathering loop, plan proposal, human plan
//!   approval
//! - **Programmer** ([`graphs::programmer`]) - the tool loop over plan
//!   items with safety and write-approval gates, history summarization,
//!   commit/push and PR management
//! - **Reviewer** ([`graphs::reviewer`]) - diff review with an optional
//!   loop back to the programmer
//!
//! Supporting modules: the [`plan`] data model with revision history, the
//! [`issue_format`] sentinels embedded in issue bodies, the narrow
//! [`scm`] seam with auth-refresh retry, the shared thread [`state`]
//! schema, [`classify`] route tables, [`context`] token management, and
//! the [`approval`] cache for destructive tool calls.

pub mod approval;
pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod graphs;
pub mod issue_format;
pub mod plan;
pub mod scm;
pub mod state;

pub use classify::{available_routes, Classification, ManagerRoute};
pub use config::{AppConfig, TriggerOptions, DEV_LABEL_SUFFIX, TRIGGER_LABELS};
pub use error::{OrchestratorError, Result};
pub use graphs::{
    register_all, AgentDeps, MANAGER_GRAPH_ID, PLANNER_GRAPH_ID, PROGRAMMER_GRAPH_ID,
    REVIEWER_GRAPH_ID,
};
pub use plan::{PlanAuthor, PlanItem, PlanRevision, Task, TaskPlan};
pub use scm::{
    Issue, IssueComment, MockSourceControl, OpenPrRequest, PullRequestRef, RetryingSourceControl,
    ScmError, SourceControl,
};
pub use state::{thread_schema, SessionRef};
