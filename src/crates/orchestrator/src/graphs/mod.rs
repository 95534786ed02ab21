//! The four agent graphs and their shared wiring
//!
//! Manager classifies incoming requests and launches the planner; the
//! planner gathers context and proposes a plan; the programmer iterates
//! the tool loop over plan items; the reviewer judges the result and
//! optionally loops back. Children are launched fire-and-forget: a parent
//! records only the child's `(thread_id, run_id)` and terminates.

pub mod manager;
pub mod planner;
pub mod programmer;
pub mod reviewer;

use crate::config::AppConfig;
use crate::error::{OrchestratorError, Result};
use crate::scm::SourceControl;
use crate::state;
use graph_core::{
    last_ai_message, GraphRuntime, Message, RunStatus, StateMap, ThreadStore,
};
use llm::ModelRouter;
use sandbox::{GitAuth, Sandbox, SandboxCoordinator, SandboxState, TargetRepository};
use std::sync::Arc;
use tools::ExecBackend;
use uuid::Uuid;

pub const MANAGER_GRAPH_ID: &str = "manager";
pub const PLANNER_GRAPH_ID: &str = "planner";
pub const PROGRAMMER_GRAPH_ID: &str = "programmer";
pub const REVIEWER_GRAPH_ID: &str = "reviewer";

/// Shared dependencies injected into every node
#[derive(Clone)]
pub struct AgentDeps {
    pub config: Arc<AppConfig>,
    pub router: Arc<ModelRouter>,
    pub scm: Arc<dyn SourceControl>,
    pub coordinator: Arc<SandboxCoordinator>,
    pub store: Arc<dyn ThreadStore>,
}

impl AgentDeps {
    pub fn new(
        config: Arc<AppConfig>,
        router: Arc<ModelRouter>,
        scm: Arc<dyn SourceControl>,
        coordinator: Arc<SandboxCoordinator>,
        store: Arc<dyn ThreadStore>,
    ) -> Self {
        Self {
            config,
            router,
            scm,
            coordinator,
            store,
        }
    }

    /// Run status of a child session, `NotStarted` when never launched.
    pub async fn session_status(&self, state: &StateMap, session_key: &str) -> RunStatus {
        match state::session_ref(state, session_key) {
            Some(session) => match self.store.get(session.thread_id).await {
                Ok(snapshot) => snapshot.status,
                Err(_) => RunStatus::NotStarted,
            },
            None => RunStatus::NotStarted,
        }
    }

    /// Git auth for clone/push, from the source-control token.
    pub async fn git_auth(&self) -> GitAuth {
        let token = self.scm.git_token().await.ok().flatten();
        GitAuth::new(&self.config.git_host, token)
    }

    /// Execution back-end for the current thread state.
    pub fn backend(&self, state: &StateMap) -> Result<ExecBackend> {
        if self.config.local_mode {
            let cwd = std::env::current_dir()
                .map_err(|e| OrchestratorError::Validation(format!("no working directory: {e}")))?;
            return Ok(ExecBackend::local(cwd.to_string_lossy()));
        }
        Ok(ExecBackend::sandbox(
            self.coordinator.provider(),
            &self.sandbox_handle(state)?,
        ))
    }

    /// Sandbox descriptor reconstructed from thread state.
    pub fn sandbox_handle(&self, state: &StateMap) -> Result<Sandbox> {
        let id = state::sandbox_session_id(state)
            .ok_or_else(|| OrchestratorError::Validation("no sandbox session in state".into()))?;
        let repo = require_repository(state)?;
        let branch = state::branch_name(state).unwrap_or_default();
        Ok(Sandbox {
            id,
            state: SandboxState::Started,
            working_dir: repo.sandbox_path(),
            branch,
        })
    }

    /// Merge a message into another thread's conversation channels.
    ///
    /// Used by the manager to forward updates into running child threads;
    /// CAS retry keeps concurrent child commits intact.
    pub async fn append_message_to_thread(&self, thread_id: Uuid, message: &Message) -> Result<()> {
        let schema = state::thread_schema();
        loop {
            let snapshot = self.store.get(thread_id).await?;
            let merged = schema.apply(snapshot.values.clone(), state::message_update(message))?;
            match self
                .store
                .update(thread_id, snapshot.version, merged, snapshot.status)
                .await
            {
                Ok(_) => return Ok(()),
                Err(graph_store::StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Required target repository, or a validation error.
pub fn require_repository(state: &StateMap) -> Result<TargetRepository> {
    state::target_repository(state)
        .ok_or_else(|| OrchestratorError::Validation("missing target repository".into()))
}

/// Required issue id, or a validation error.
pub fn require_issue_id(state: &StateMap) -> Result<u64> {
    state::github_issue_id(state)
        .ok_or_else(|| OrchestratorError::Validation("missing github issue id".into()))
}

/// Last AI message of the internal conversation.
pub fn last_internal_ai(state: &StateMap) -> Option<Message> {
    let messages = state::internal_messages(state);
    last_ai_message(&messages).cloned()
}

/// Latest non-hidden human message, newest first.
pub fn latest_human_message(state: &StateMap) -> Option<Message> {
    state::messages(state)
        .into_iter()
        .rev()
        .find(|m| m.is_human() && !m.kwarg_flag(state::kwargs::HIDDEN))
}

/// Whether the named tool is called on the message.
pub fn calls_tool(message: &Message, tool: &str) -> bool {
    message.tool_calls().iter().any(|c| c.name == tool)
}

/// First call of the named tool on the message.
pub fn tool_call_named(message: &Message, tool: &str) -> Option<graph_core::ToolCall> {
    message.tool_calls().iter().find(|c| c.name == tool).cloned()
}

/// Build and register all four graphs on a runtime.
pub fn register_all(runtime: &GraphRuntime, deps: &AgentDeps) -> Result<()> {
    runtime.register(manager::build(deps.clone())?);
    runtime.register(planner::build(deps.clone())?);
    runtime.register(programmer::build(deps.clone())?);
    runtime.register(reviewer::build(deps.clone())?);
    Ok(())
}

pub mod testing {
    //! In-memory wiring for tests: mock SCM, mock sandbox provider, and a
    //! caller-supplied chat model behind every task class.

    use super::*;
    use crate::scm::{MockSourceControl, RetryingSourceControl};
    use graph_core::InMemoryThreadStore;
    use llm::{ModelChain, ModelRouter, TaskClass};
    use sandbox::{MockProvider, SandboxConfig};

    /// Deps wired entirely to in-memory fakes.
    pub fn deps_with(
        scm: Arc<MockSourceControl>,
        provider: Arc<MockProvider>,
        model: Arc<dyn graph_core::ChatModel>,
        config: AppConfig,
    ) -> (AgentDeps, GraphRuntime) {
        let local_mode = config.local_mode;
        let config = Arc::new(config);

        let router = Arc::new(
            ModelRouter::new()
                .with_chain(TaskClass::Router, ModelChain::new(model.clone()))
                .with_chain(TaskClass::Summarizer, ModelChain::new(model.clone()))
                .with_chain(TaskClass::Planner, ModelChain::new(model.clone()))
                .with_chain(TaskClass::Programmer, ModelChain::new(model)),
        );

        let sandbox_config = if local_mode {
            SandboxConfig::local()
        } else {
            SandboxConfig::new("test-snapshot", "patchwork")
        };
        let coordinator = Arc::new(SandboxCoordinator::new(provider, sandbox_config));
        let store: Arc<dyn ThreadStore> = Arc::new(InMemoryThreadStore::new());

        let deps = AgentDeps::new(
            config,
            router,
            Arc::new(RetryingSourceControl::new(scm)),
            coordinator,
            store.clone(),
        );
        let runtime = GraphRuntime::new(store);
        register_all(&runtime, &deps).expect("graphs build");
        (deps, runtime)
    }
}
