//! Sandbox provider trait and the in-memory test double
//!
//! [`SandboxProvider`] is the narrow seam to whatever service actually
//! hosts execution environments. The coordinator only needs create / get /
//! start / stop / delete plus command execution. [`MockProvider`] backs
//! tests and local development with scriptable behavior.

use crate::error::{Result, SandboxError};
use crate::types::{CreateParams, ExecOutput, ExecRequest, Sandbox, SandboxState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// External service hosting isolated execution environments
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a new sandbox from a snapshot.
    async fn create(&self, params: &CreateParams) -> Result<Sandbox>;

    /// Look up a sandbox by id.
    async fn get(&self, sandbox_id: &str) -> Result<Sandbox>;

    /// Start a stopped or archived sandbox.
    async fn start(&self, sandbox_id: &str) -> Result<Sandbox>;

    /// Stop a started sandbox. Stopping a stopped or archived sandbox is a
    /// no-op.
    async fn stop(&self, sandbox_id: &str) -> Result<Sandbox>;

    /// Delete a sandbox.
    async fn delete(&self, sandbox_id: &str) -> Result<()>;

    /// Execute a command inside a sandbox, capturing output.
    async fn exec(&self, sandbox_id: &str, request: ExecRequest) -> Result<ExecOutput>;
}

/// Scriptable in-memory provider for tests and local development
///
/// Exec calls are recorded; responses come from a scripted queue, falling
/// back to empty success. Creation can be forced to fail a set number of
/// times to exercise retry paths.
#[derive(Default)]
pub struct MockProvider {
    sandboxes: Mutex<HashMap<String, Sandbox>>,
    exec_log: Mutex<Vec<(String, ExecRequest)>>,
    exec_script: Mutex<VecDeque<ExecOutput>>,
    create_failures: AtomicUsize,
    creates: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a sandbox in a given state.
    pub fn with_sandbox(self, sandbox: Sandbox) -> Self {
        self.sandboxes.lock().insert(sandbox.id.clone(), sandbox);
        self
    }

    /// Fail the next `n` create calls.
    pub fn fail_next_creates(&self, n: usize) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    /// Queue the output returned by the next exec call.
    pub fn script_exec(&self, output: ExecOutput) {
        self.exec_script.lock().push_back(output);
    }

    /// All exec requests issued so far, with their sandbox ids.
    pub fn exec_log(&self) -> Vec<(String, ExecRequest)> {
        self.exec_log.lock().clone()
    }

    /// Rendered command lines issued so far, for assertions.
    pub fn exec_command_lines(&self) -> Vec<String> {
        self.exec_log
            .lock()
            .iter()
            .map(|(_, req)| req.command.join(" "))
            .collect()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxProvider for MockProvider {
    async fn create(&self, _params: &CreateParams) -> Result<Sandbox> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SandboxError::Provider("create capacity exceeded".into()));
        }

        let sandbox = Sandbox {
            id: Uuid::new_v4().to_string(),
            state: SandboxState::Started,
            working_dir: String::new(),
            branch: String::new(),
        };
        self.sandboxes
            .lock()
            .insert(sandbox.id.clone(), sandbox.clone());
        Ok(sandbox)
    }

    async fn get(&self, sandbox_id: &str) -> Result<Sandbox> {
        self.sandboxes
            .lock()
            .get(sandbox_id)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))
    }

    async fn start(&self, sandbox_id: &str) -> Result<Sandbox> {
        let mut sandboxes = self.sandboxes.lock();
        let sandbox = sandboxes
            .get_mut(sandbox_id)
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        sandbox.state = SandboxState::Started;
        Ok(sandbox.clone())
    }

    async fn stop(&self, sandbox_id: &str) -> Result<Sandbox> {
        let mut sandboxes = self.sandboxes.lock();
        let sandbox = sandboxes
            .get_mut(sandbox_id)
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        // Stop on stopped/archived is a no-op.
        if sandbox.state == SandboxState::Started {
            sandbox.state = SandboxState::Stopped;
        }
        Ok(sandbox.clone())
    }

    async fn delete(&self, sandbox_id: &str) -> Result<()> {
        self.sandboxes.lock().remove(sandbox_id);
        Ok(())
    }

    async fn exec(&self, sandbox_id: &str, request: ExecRequest) -> Result<ExecOutput> {
        if !self.sandboxes.lock().contains_key(sandbox_id) {
            return Err(SandboxError::NotFound(sandbox_id.to_string()));
        }
        self.exec_log
            .lock()
            .push((sandbox_id.to_string(), request));
        Ok(self
            .exec_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| ExecOutput::success("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_failures_are_consumed() {
        let provider = MockProvider::new();
        provider.fail_next_creates(2);

        assert!(provider.create(&CreateParams::new("img")).await.is_err());
        assert!(provider.create(&CreateParams::new("img")).await.is_err());
        assert!(provider.create(&CreateParams::new("img")).await.is_ok());
        assert_eq!(provider.create_count(), 3);
    }

    #[tokio::test]
    async fn stop_is_noop_on_archived() {
        let provider = MockProvider::new().with_sandbox(Sandbox {
            id: "sb".into(),
            state: SandboxState::Archived,
            working_dir: String::new(),
            branch: String::new(),
        });

        let sandbox = provider.stop("sb").await.unwrap();
        assert_eq!(sandbox.state, SandboxState::Archived);
    }

    #[tokio::test]
    async fn exec_is_scripted_and_logged() {
        let provider = MockProvider::new().with_sandbox(Sandbox {
            id: "sb".into(),
            state: SandboxState::Started,
            working_dir: String::new(),
            branch: String::new(),
        });
        provider.script_exec(ExecOutput::failure(1, "fatal: not a git repository"));

        let output = provider
            .exec("sb", ExecRequest::new(["git", "status"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 1);
        assert_eq!(provider.exec_command_lines(), vec!["git status"]);
    }
}
