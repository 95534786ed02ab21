//! Dual execution back-ends for file and shell tools
//!
//! Tools run either against the local machine (local mode) or inside the
//! acquired sandbox via the provider's process API. [`ExecBackend`] hides
//! the difference: commands, file reads, and file writes all route through
//! it, and sandbox-prefixed absolute paths are mapped onto the local
//! checkout when running locally.

use crate::error::{Result, ToolError};
use crate::paths::{map_sandbox_path, normalize_path};
use sandbox::{ExecOutput, ExecRequest, Sandbox, SandboxProvider};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Exit code reported for commands killed on timeout
pub const TIMEOUT_EXIT_CODE: i64 = 124;

/// Grace period between SIGTERM and SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Shell executor for local mode
///
/// Spawns through `bash`, falling back to `sh` when bash is unavailable,
/// and merges the process environment with defaults that disable
/// interactive package-manager prompts.
#[derive(Clone)]
pub struct LocalExecutor {
    workdir: String,
    default_env: HashMap<String, String>,
}

impl LocalExecutor {
    pub fn new(workdir: impl Into<String>) -> Self {
        let mut default_env = HashMap::new();
        default_env.insert("CI".to_string(), "true".to_string());
        default_env.insert("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string());
        default_env.insert("GIT_TERMINAL_PROMPT".to_string(), "0".to_string());
        default_env.insert("npm_config_yes".to_string(), "true".to_string());
        default_env.insert("PIP_NO_INPUT".to_string(), "1".to_string());

        Self {
            workdir: workdir.into(),
            default_env,
        }
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    fn shell_line(command: &[String]) -> String {
        if command.len() == 1 {
            return command[0].clone();
        }
        command
            .iter()
            .map(|arg| {
                if arg.is_empty()
                    || arg
                        .chars()
                        .any(|c| c.is_whitespace() || "\"'`$\\|&;<>()*?![]{}".contains(c))
                {
                    format!("'{}'", arg.replace('\'', r"'\''"))
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn spawn_shell(
        &self,
        shell: &str,
        line: &str,
        request: &ExecRequest,
    ) -> std::io::Result<tokio::process::Child> {
        let cwd = request.cwd.clone().unwrap_or_else(|| self.workdir.clone());
        tokio::process::Command::new(shell)
            .arg("-c")
            .arg(line)
            .current_dir(cwd)
            .envs(std::env::vars())
            .envs(&self.default_env)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }

    /// Run a command with the request's timeout.
    ///
    /// On timeout the process receives SIGTERM (then SIGKILL after a grace
    /// period); captured output is preserved and the result carries exit
    /// code [`TIMEOUT_EXIT_CODE`]. A timeout is never a silent failure.
    pub async fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let line = Self::shell_line(&request.command);
        debug!(command = %line, cwd = ?request.cwd, "executing locally");

        let mut child = match self.spawn_shell("bash", &line, &request) {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.spawn_shell("sh", &line, &request)?
            }
            Err(e) => return Err(e.into()),
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = tokio::time::sleep(request.timeout) => None,
        };

        let exit_code = match status {
            Some(status) => status.code().map(i64::from).unwrap_or(-1),
            None => {
                warn!(command = %line, timeout = ?request.timeout, "command timed out, killing");
                terminate(&mut child).await;
                TIMEOUT_EXIT_CODE
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let mut stderr = stderr_task.await.unwrap_or_default();
        if exit_code == TIMEOUT_EXIT_CODE {
            stderr.push_str(&format!(
                "\n[process killed after {}s timeout]",
                request.timeout.as_secs()
            ));
        }

        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[cfg(unix)]
async fn terminate(child: &mut tokio::process::Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut tokio::process::Child) {
    let _ = child.kill().await;
}

/// Where tool side effects land: the local shell or a sandbox
#[derive(Clone)]
pub enum ExecBackend {
    Local(LocalExecutor),
    Sandbox {
        provider: Arc<dyn SandboxProvider>,
        sandbox_id: String,
        workdir: String,
    },
}

impl ExecBackend {
    pub fn local(workdir: impl Into<String>) -> Self {
        ExecBackend::Local(LocalExecutor::new(workdir))
    }

    pub fn sandbox(provider: Arc<dyn SandboxProvider>, sandbox: &Sandbox) -> Self {
        ExecBackend::Sandbox {
            provider,
            sandbox_id: sandbox.id.clone(),
            workdir: sandbox.working_dir.clone(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ExecBackend::Local(_))
    }

    pub fn workdir(&self) -> &str {
        match self {
            ExecBackend::Local(executor) => executor.workdir(),
            ExecBackend::Sandbox { workdir, .. } => workdir,
        }
    }

    /// Normalize a tool-supplied path for this back-end.
    ///
    /// Local mode maps sandbox-prefixed absolute paths onto the local
    /// checkout so the model can use either spelling.
    pub fn resolve_path(&self, path: &str) -> String {
        match self {
            ExecBackend::Local(executor) => map_sandbox_path(path, executor.workdir()),
            ExecBackend::Sandbox { workdir, .. } => normalize_path(path, workdir),
        }
    }

    pub async fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        match self {
            ExecBackend::Local(executor) => executor.run(request).await,
            ExecBackend::Sandbox {
                provider,
                sandbox_id,
                ..
            } => Ok(provider.exec(sandbox_id, request).await?),
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve_path(path);
        match self {
            ExecBackend::Local(_) => Ok(tokio::fs::read_to_string(&resolved).await?),
            ExecBackend::Sandbox { .. } => {
                let output = self.run(ExecRequest::new(["cat", resolved.as_str()])).await?;
                if output.is_success() {
                    Ok(output.stdout)
                } else {
                    Err(ToolError::Execution(format!(
                        "cannot read {resolved}: {}",
                        output.stderr.trim()
                    )))
                }
            }
        }
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let resolved = self.resolve_path(path);
        match self {
            ExecBackend::Local(_) => {
                if let Some(parent) = Path::new(&resolved).parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                Ok(tokio::fs::write(&resolved, content).await?)
            }
            ExecBackend::Sandbox { .. } => {
                let parent = Path::new(&resolved)
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "/".to_string());
                let script = r#"mkdir -p "$1" && printf '%s' "$2" > "$3""#;
                let output = self
                    .run(ExecRequest::new([
                        "sh", "-c", script, "sh", &parent, content, &resolved,
                    ]))
                    .await?;
                if output.is_success() {
                    Ok(())
                } else {
                    Err(ToolError::Execution(format!(
                        "cannot write {resolved}: {}",
                        output.stderr.trim()
                    )))
                }
            }
        }
    }

    pub async fn file_exists(&self, path: &str) -> bool {
        let resolved = self.resolve_path(path);
        match self {
            ExecBackend::Local(_) => tokio::fs::metadata(&resolved).await.is_ok(),
            ExecBackend::Sandbox { .. } => self
                .run(ExecRequest::new(["test", "-e", resolved.as_str()]))
                .await
                .map(|o| o.is_success())
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_line_quotes_special_arguments() {
        let line = LocalExecutor::shell_line(&[
            "echo".to_string(),
            "hello world".to_string(),
            "$HOME".to_string(),
        ]);
        assert_eq!(line, "echo 'hello world' '$HOME'");
    }

    #[tokio::test]
    async fn local_run_captures_stdout_and_exit_code() {
        let executor = LocalExecutor::new("/tmp");
        let output = executor
            .run(ExecRequest::new(["echo", "hi"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn local_run_reports_failures() {
        let executor = LocalExecutor::new("/tmp");
        let output = executor
            .run(ExecRequest::new(["sh -c 'echo oops >&2; exit 3'"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(output.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn timeout_kills_and_reports() {
        let executor = LocalExecutor::new("/tmp");
        let output = executor
            .run(
                ExecRequest::new(["sleep 30"])
                    .with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();
        assert_eq!(output.exit_code, TIMEOUT_EXIT_CODE);
        assert!(output.stderr.contains("killed after"));
    }

    #[tokio::test]
    async fn local_backend_roundtrips_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ExecBackend::local(dir.path().to_string_lossy());

        backend
            .write_file("notes/plan.md", "first step")
            .await
            .unwrap();
        let content = backend.read_file("notes/plan.md").await.unwrap();
        assert_eq!(content, "first step");
        assert!(backend.file_exists("notes/plan.md").await);
        assert!(!backend.file_exists("notes/missing.md").await);
    }

    #[tokio::test]
    async fn sandbox_spelled_paths_work_locally() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ExecBackend::local(dir.path().to_string_lossy());

        backend
            .write_file("/home/agent/widget/src/lib.rs", "pub fn x() {}")
            .await
            .unwrap();
        let content = backend.read_file("src/lib.rs").await.unwrap();
        assert_eq!(content, "pub fn x() {}");
    }
}
