//! Codebase tree snapshots
//!
//! A compact directory listing generated right after checkout, handed to
//! the planner as orientation context. Built from `git ls-files` so ignored
//! artifacts never appear.

use crate::error::Result;
use crate::provider::SandboxProvider;
use crate::types::ExecRequest;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Cap on rendered entries so huge repositories stay digestible
pub const MAX_TREE_ENTRIES: usize = 500;

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
    is_file: bool,
}

impl TreeNode {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for (i, component) in components.iter().enumerate() {
            node = node.children.entry((*component).to_string()).or_default();
            if i == components.len() - 1 {
                node.is_file = true;
            }
        }
    }

    fn render(&self, indent: usize, out: &mut String, remaining: &mut usize) {
        for (name, child) in &self.children {
            if *remaining == 0 {
                return;
            }
            *remaining -= 1;
            out.push_str(&"  ".repeat(indent));
            out.push_str(name);
            if !child.is_file || !child.children.is_empty() {
                out.push('/');
            }
            out.push('\n');
            child.render(indent + 1, out, remaining);
        }
    }
}

/// Render a path list as an indented tree, capped at `max_entries` lines.
pub fn render_tree(paths: &[&str], max_entries: usize) -> String {
    let mut root = TreeNode::default();
    for path in paths {
        root.insert(path);
    }

    let mut out = String::new();
    let mut remaining = max_entries;
    root.render(0, &mut out, &mut remaining);
    if remaining == 0 {
        out.push_str("... (truncated)\n");
    }
    out
}

/// Snapshot the tracked files of a sandbox checkout.
pub async fn codebase_tree(
    provider: &Arc<dyn SandboxProvider>,
    sandbox_id: &str,
    repo_path: &str,
) -> Result<String> {
    let output = provider
        .exec(
            sandbox_id,
            ExecRequest::new(["git", "ls-files"])
                .in_dir(repo_path)
                .with_timeout(Duration::from_secs(60)),
        )
        .await?;

    let paths: Vec<&str> = output.stdout.lines().map(str::trim).collect();
    Ok(render_tree(&paths, MAX_TREE_ENTRIES))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_directories() {
        let tree = render_tree(
            &["src/main.rs", "src/lib.rs", "Cargo.toml", "src/bin/cli.rs"],
            100,
        );

        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(lines[0], "Cargo.toml");
        assert_eq!(lines[1], "src/");
        assert!(lines.contains(&"  bin/"));
        assert!(lines.contains(&"    cli.rs"));
        assert!(lines.contains(&"  lib.rs"));
    }

    #[test]
    fn truncates_at_entry_cap() {
        let paths: Vec<String> = (0..50).map(|i| format!("file-{i:02}.rs")).collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();

        let tree = render_tree(&refs, 10);
        assert!(tree.ends_with("... (truncated)\n"));
        assert_eq!(tree.lines().count(), 11);
    }
}
