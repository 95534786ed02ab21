//! Sandbox descriptors and execution request/response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Sandbox id used in local mode instead of a real provider sandbox
pub const LOCAL_MOCK_ID: &str = "local-mock";

/// Root directory for repository checkouts inside a sandbox
pub const SANDBOX_ROOT: &str = "/home/agent";

/// Default idle interval before a sandbox is auto-deleted by the provider
pub const DEFAULT_AUTO_DELETE_MINUTES: u64 = 15;

/// Lifecycle state reported by the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Starting,
    Started,
    Stopped,
    Archived,
    Error,
}

/// A provisioned execution environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sandbox {
    pub id: String,
    pub state: SandboxState,

    /// Absolute path of the checked-out repository inside the sandbox
    pub working_dir: String,

    /// Branch the checkout is on
    pub branch: String,
}

impl Sandbox {
    /// The mock sandbox returned in local mode
    pub fn local_mock() -> Self {
        Self {
            id: LOCAL_MOCK_ID.to_string(),
            state: SandboxState::Started,
            working_dir: String::new(),
            branch: String::new(),
        }
    }

    pub fn is_local_mock(&self) -> bool {
        self.id == LOCAL_MOCK_ID
    }
}

/// Repository a sandbox is bound to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetRepository {
    pub owner: String,
    pub name: String,

    /// Base branch new work branches off (default branch when `None`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
}

impl TargetRepository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            base_branch: None,
        }
    }

    pub fn with_base_branch(mut self, branch: impl Into<String>) -> Self {
        self.base_branch = Some(branch.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Canonical absolute checkout path inside a sandbox
    pub fn sandbox_path(&self) -> String {
        format!("{SANDBOX_ROOT}/{}", self.name)
    }
}

/// Parameters for provisioning a new sandbox
#[derive(Debug, Clone)]
pub struct CreateParams {
    /// Provider snapshot/image to boot from
    pub snapshot_name: String,

    /// Idle interval before the provider deletes the sandbox
    pub auto_delete_interval: Duration,
}

impl CreateParams {
    pub fn new(snapshot_name: impl Into<String>) -> Self {
        Self {
            snapshot_name: snapshot_name.into(),
            auto_delete_interval: Duration::from_secs(DEFAULT_AUTO_DELETE_MINUTES * 60),
        }
    }

    pub fn with_auto_delete_interval(mut self, interval: Duration) -> Self {
        self.auto_delete_interval = interval;
        self
    }
}

/// A command to execute inside a sandbox
#[derive(Debug, Clone, PartialEq)]
pub struct ExecRequest {
    pub command: Vec<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl ExecRequest {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            cwd: None,
            env: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured output of an executed command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_path_is_canonical() {
        let repo = TargetRepository::new("acme", "widget");
        assert_eq!(repo.sandbox_path(), "/home/agent/widget");
        assert_eq!(repo.full_name(), "acme/widget");
    }

    #[test]
    fn local_mock_is_started() {
        let mock = Sandbox::local_mock();
        assert!(mock.is_local_mock());
        assert_eq!(mock.state, SandboxState::Started);
    }

    #[test]
    fn create_params_default_auto_delete() {
        let params = CreateParams::new("base-image");
        assert_eq!(params.auto_delete_interval, Duration::from_secs(15 * 60));
    }
}
