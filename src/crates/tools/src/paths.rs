//! Path normalization and approval keys
//!
//! Write approvals are cached per `(tool, directory)` pair. The key must be
//! stable under path spelling: `foo/../bar` and `bar` produce the same key,
//! and relative paths resolve against the declared working directory. The
//! same normalization maps sandbox-prefixed absolute paths back to the
//! local checkout in local mode.

use sandbox::SANDBOX_ROOT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `cwd` and collapse `.` / `..` components
/// lexically (no filesystem access, so unborn paths normalize too).
pub fn normalize_path(path: &str, cwd: &str) -> String {
    let joined = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        Path::new(cwd).join(path)
    };

    let mut parts: Vec<String> = Vec::new();
    for component in joined.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => {
                parts.clear();
            }
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Parent directory of a normalized path (`/` for the root)
pub fn normalized_dirname(path: &str, cwd: &str) -> String {
    let normalized = normalize_path(path, cwd);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => normalized[..index].to_string(),
    }
}

/// Map a tool-supplied path onto the local working directory.
///
/// Sandbox-prefixed absolute paths (`/home/agent/<repo>/...`) translate to
/// the corresponding path under `local_workdir`; relative paths resolve
/// against `local_workdir`; other absolute paths pass through normalized.
pub fn map_sandbox_path(path: &str, local_workdir: &str) -> String {
    if !Path::new(path).is_absolute() {
        return normalize_path(path, local_workdir);
    }

    let normalized = normalize_path(path, "/");
    match normalized.strip_prefix(SANDBOX_ROOT) {
        Some(rest) => {
            // Drop the repository directory component as well: the local
            // working directory already is the checkout root.
            let rest = rest.trim_start_matches('/');
            let relative = match rest.split_once('/') {
                Some((_repo, tail)) => tail,
                None => "",
            };
            if relative.is_empty() {
                local_workdir.to_string()
            } else {
                format!("{}/{relative}", local_workdir.trim_end_matches('/'))
            }
        }
        None => normalized,
    }
}

/// Cache key for a remembered write approval: `<tool>:<normalized-dir>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApprovalKey(String);

impl ApprovalKey {
    pub fn new(tool: &str, normalized_dir: &str) -> Self {
        Self(format!("{tool}:{normalized_dir}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApprovalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ApprovalKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Tools whose calls require write approval
pub const WRITE_COMMAND_TOOLS: &[&str] = &[
    "shell",
    "apply_patch",
    "str_replace_based_edit_tool",
    "install_dependencies",
    "write_default_tsconfig",
];

/// Derive the approval key for a proposed tool call.
///
/// Target-directory rules per tool family: file-edit tools use the parent
/// of the resolved `path`; shell-style tools use their declared `cwd` (or
/// the process working directory); listing/search tools use their
/// directory argument.
pub fn approval_key_for_call(tool: &str, args: &Value, process_cwd: &str) -> ApprovalKey {
    let dir = match tool {
        "apply_patch" | "str_replace_based_edit_tool" | "view" | "write_default_tsconfig" => args
            .get("path")
            .and_then(Value::as_str)
            .map(|p| normalized_dirname(p, process_cwd))
            .unwrap_or_else(|| normalize_path(process_cwd, "/")),
        "grep" => args
            .get("directory")
            .and_then(Value::as_str)
            .map(|d| normalize_path(d, process_cwd))
            .unwrap_or_else(|| normalize_path(process_cwd, "/")),
        // shell, install_dependencies, and anything else command-shaped
        _ => args
            .get("cwd")
            .and_then(Value::as_str)
            .map(|d| normalize_path(d, process_cwd))
            .unwrap_or_else(|| normalize_path(process_cwd, "/")),
    };
    ApprovalKey::new(tool, &dir)
}
