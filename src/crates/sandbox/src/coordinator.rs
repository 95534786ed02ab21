//! Sandbox acquisition, reuse, and recovery
//!
//! [`SandboxCoordinator::acquire`] turns a `(repository, branch)` pair plus
//! an optional previous session id into a ready-to-use environment:
//!
//! 1. local mode short-circuits to the mock sandbox,
//! 2. a live previous sandbox is reused (restarted when stopped/archived),
//! 3. anything else falls through to RECREATE: provision (3 attempts),
//!    clone into the canonical path, set up the work branch, and snapshot
//!    the codebase tree.

use crate::error::{Result, SandboxError};
use crate::git::{CommitIdentity, GitAuth, GitWorkspace};
use crate::provider::SandboxProvider;
use crate::tree::codebase_tree;
use crate::types::{CreateParams, Sandbox, SandboxState, TargetRepository};
use std::sync::Arc;
use std::time::Duration;
use tooling::{with_retry, RetryPolicy};
use tracing::{info, warn};

/// Coordinator configuration, sourced from the app environment
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Local mode bypasses the provider entirely
    pub local_mode: bool,

    /// Provider snapshot sandboxes boot from (`SANDBOX_SNAPSHOT_NAME`)
    pub snapshot_name: String,

    /// Idle auto-delete interval configured on created sandboxes
    pub auto_delete_interval: Duration,

    /// Source-control host, e.g. `github.com`
    pub git_host: String,

    /// App identity used for synthetic commits (`APP_NAME`)
    pub app_name: String,

    /// Append `[skip ci]` to patch commits
    pub skip_ci: bool,
}

impl SandboxConfig {
    pub fn new(snapshot_name: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            local_mode: false,
            snapshot_name: snapshot_name.into(),
            auto_delete_interval: Duration::from_secs(
                crate::types::DEFAULT_AUTO_DELETE_MINUTES * 60,
            ),
            git_host: "github.com".to_string(),
            app_name: app_name.into(),
            skip_ci: false,
        }
    }

    pub fn local() -> Self {
        let mut config = Self::new("", "patchwork");
        config.local_mode = true;
        config
    }

    pub fn with_git_host(mut self, host: impl Into<String>) -> Self {
        self.git_host = host.into();
        self
    }

    pub fn with_skip_ci(mut self, skip_ci: bool) -> Self {
        self.skip_ci = skip_ci;
        self
    }

    pub fn identity(&self) -> CommitIdentity {
        CommitIdentity::new(&self.app_name, &self.git_host)
    }
}

/// What `acquire` hands back to the caller
#[derive(Debug, Clone)]
pub struct AcquireResult {
    pub sandbox: Sandbox,

    /// Present only after a fresh checkout
    pub codebase_tree: Option<String>,

    /// `Some(false)` after RECREATE: dependencies need installing again
    pub dependencies_installed: Option<bool>,
}

/// Lifecycle manager for execution sandboxes
pub struct SandboxCoordinator {
    provider: Arc<dyn SandboxProvider>,
    config: SandboxConfig,
}

impl SandboxCoordinator {
    pub fn new(provider: Arc<dyn SandboxProvider>, config: SandboxConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> Arc<dyn SandboxProvider> {
        self.provider.clone()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Provide a ready sandbox for `(repository, branch)`.
    ///
    /// Acquisition is idempotent: calling again with the id returned
    /// earlier reuses the same environment when it is still alive.
    pub async fn acquire(
        &self,
        session_id: Option<&str>,
        repo: &TargetRepository,
        branch: &str,
        auth: &GitAuth,
    ) -> Result<AcquireResult> {
        if self.config.local_mode {
            return Ok(AcquireResult {
                sandbox: Sandbox::local_mock(),
                codebase_tree: None,
                dependencies_installed: None,
            });
        }

        if let Some(id) = session_id {
            match self.provider.get(id).await {
                Ok(sandbox) if sandbox.state == SandboxState::Started => {
                    info!(sandbox = %id, "reusing running sandbox");
                    return Ok(AcquireResult {
                        sandbox,
                        codebase_tree: None,
                        dependencies_installed: None,
                    });
                }
                Ok(sandbox)
                    if matches!(
                        sandbox.state,
                        SandboxState::Stopped | SandboxState::Archived
                    ) =>
                {
                    info!(sandbox = %id, state = ?sandbox.state, "restarting sandbox");
                    let sandbox = self.provider.start(id).await?;
                    return Ok(AcquireResult {
                        sandbox,
                        codebase_tree: None,
                        dependencies_installed: None,
                    });
                }
                Ok(sandbox) => {
                    warn!(sandbox = %id, state = ?sandbox.state, "sandbox unusable, recreating");
                }
                Err(e) => {
                    warn!(sandbox = %id, error = %e, "sandbox lookup failed, recreating");
                }
            }
        }

        self.recreate(repo, branch, auth).await
    }

    /// Provision a fresh sandbox and check the repository out.
    async fn recreate(
        &self,
        repo: &TargetRepository,
        branch: &str,
        auth: &GitAuth,
    ) -> Result<AcquireResult> {
        let params = CreateParams::new(&self.config.snapshot_name)
            .with_auto_delete_interval(self.config.auto_delete_interval);

        let policy = RetryPolicy::new(3).with_initial_interval(1.0);
        let mut sandbox = with_retry(&policy, "sandbox-create", || {
            let provider = self.provider.clone();
            let params = params.clone();
            async move { provider.create(&params).await }
        })
        .await
        .map_err(|e| SandboxError::CreationFailed {
            attempts: 3,
            last_error: e.to_string(),
        })?;

        let repo_path = repo.sandbox_path();
        let workspace = GitWorkspace::new(
            self.provider.clone(),
            sandbox.id.clone(),
            repo_path.clone(),
            branch,
        );
        workspace.clone_repository(repo, auth).await?;
        workspace.ensure_branch(repo, &self.config.identity()).await?;

        let tree = codebase_tree(&self.provider, &sandbox.id, &repo_path).await?;

        sandbox.working_dir = repo_path;
        sandbox.branch = branch.to_string();
        info!(sandbox = %sandbox.id, repo = %repo.full_name(), branch, "sandbox ready");

        Ok(AcquireResult {
            sandbox,
            codebase_tree: Some(tree),
            dependencies_installed: Some(false),
        })
    }

    /// Stop a sandbox; stopping a stopped or archived sandbox is a no-op.
    pub async fn safe_stop(&self, sandbox_id: &str) -> Result<()> {
        if self.config.local_mode || sandbox_id == crate::types::LOCAL_MOCK_ID {
            return Ok(());
        }
        self.provider.stop(sandbox_id).await?;
        Ok(())
    }

    /// Workspace handle for the commit/push protocol.
    pub fn workspace(&self, sandbox: &Sandbox) -> GitWorkspace {
        GitWorkspace::new(
            self.provider.clone(),
            sandbox.id.clone(),
            sandbox.working_dir.clone(),
            sandbox.branch.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use crate::types::ExecOutput;

    fn config() -> SandboxConfig {
        SandboxConfig::new("base-image", "patchwork")
    }

    fn repo() -> TargetRepository {
        TargetRepository::new("acme", "widget")
    }

    fn auth() -> GitAuth {
        GitAuth::new("github.com", Some("tok".into()))
    }

    fn sandbox_in(state: SandboxState) -> Sandbox {
        Sandbox {
            id: "existing".into(),
            state,
            working_dir: "/home/agent/widget".into(),
            branch: "feature/x".into(),
        }
    }

    #[tokio::test]
    async fn local_mode_returns_mock() {
        let coordinator = SandboxCoordinator::new(
            Arc::new(MockProvider::new()),
            SandboxConfig::local(),
        );

        let result = coordinator
            .acquire(None, &repo(), "feature/x", &auth())
            .await
            .unwrap();
        assert!(result.sandbox.is_local_mock());
        assert!(result.codebase_tree.is_none());
        assert!(result.dependencies_installed.is_none());
    }

    #[tokio::test]
    async fn running_sandbox_is_reused_as_is() {
        let provider = Arc::new(MockProvider::new().with_sandbox(sandbox_in(SandboxState::Started)));
        let coordinator = SandboxCoordinator::new(provider.clone(), config());

        let result = coordinator
            .acquire(Some("existing"), &repo(), "feature/x", &auth())
            .await
            .unwrap();
        assert_eq!(result.sandbox.id, "existing");
        assert!(result.codebase_tree.is_none());
        assert_eq!(provider.create_count(), 0);
    }

    #[tokio::test]
    async fn stopped_sandbox_is_started() {
        let provider = Arc::new(MockProvider::new().with_sandbox(sandbox_in(SandboxState::Stopped)));
        let coordinator = SandboxCoordinator::new(provider.clone(), config());

        let result = coordinator
            .acquire(Some("existing"), &repo(), "feature/x", &auth())
            .await
            .unwrap();
        assert_eq!(result.sandbox.state, SandboxState::Started);
        assert_eq!(provider.create_count(), 0);
    }

    #[tokio::test]
    async fn missing_sandbox_triggers_recreate_with_checkout() {
        let provider = Arc::new(MockProvider::new());
        // ls-remote: branch does not exist yet; everything else defaults.
        let coordinator = SandboxCoordinator::new(provider.clone(), config());

        let result = coordinator
            .acquire(Some("gone"), &repo(), "feature/x", &auth())
            .await
            .unwrap();

        assert_eq!(result.sandbox.state, SandboxState::Started);
        assert_eq!(result.sandbox.working_dir, "/home/agent/widget");
        assert_eq!(result.dependencies_installed, Some(false));
        assert!(result.codebase_tree.is_some());

        let commands = provider.exec_command_lines();
        assert!(commands.iter().any(|c| c.starts_with("git clone")));
        assert!(commands.iter().any(|c| c.contains("checkout -b feature/x")));
    }

    #[tokio::test]
    async fn create_retries_through_transient_failures() {
        let provider = Arc::new(MockProvider::new());
        provider.fail_next_creates(2);
        let coordinator = SandboxCoordinator::new(provider.clone(), config());

        let result = coordinator
            .acquire(None, &repo(), "feature/x", &auth())
            .await
            .unwrap();
        assert_eq!(result.sandbox.state, SandboxState::Started);
        assert_eq!(provider.create_count(), 3);
    }

    #[tokio::test]
    async fn create_gives_up_after_three_attempts() {
        let provider = Arc::new(MockProvider::new());
        provider.fail_next_creates(5);
        let coordinator = SandboxCoordinator::new(provider.clone(), config());

        let err = coordinator
            .acquire(None, &repo(), "feature/x", &auth())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::CreationFailed { attempts: 3, .. }));
        assert_eq!(provider.create_count(), 3);
    }

    #[tokio::test]
    async fn existing_tree_snapshot_renders_files() {
        let provider = Arc::new(MockProvider::new());
        let coordinator = SandboxCoordinator::new(provider.clone(), config());

        // Script: ls-remote (empty), then defaults until ls-files.
        provider.script_exec(ExecOutput::success("")); // clone
        provider.script_exec(ExecOutput::success("")); // ls-remote
        provider.script_exec(ExecOutput::success("")); // checkout -b
        provider.script_exec(ExecOutput::success("")); // empty commit
        provider.script_exec(ExecOutput::success("")); // push -u
        provider.script_exec(ExecOutput::success("src/main.rs\nCargo.toml\n")); // ls-files

        let result = coordinator
            .acquire(None, &repo(), "feature/x", &auth())
            .await
            .unwrap();
        let tree = result.codebase_tree.unwrap();
        assert!(tree.contains("Cargo.toml"));
        assert!(tree.contains("src/"));
    }
}
