//! Core tool set
//!
//! Assembly of the tools every agent binds: shell and dependency
//! installation, file viewing/editing, search, URL fetching, notes, and the
//! plan/workflow markers intercepted by orchestrator nodes. Review-reply
//! tools are included only when the run was triggered by a PR review.

pub mod files;
pub mod notes;
pub mod plan;
pub mod search;
pub mod shell;
pub mod web;

use crate::registry::ToolRegistry;

/// Build the default registry.
///
/// `include_review_tools` adds the reply tools used when responding to a
/// pull-request review.
pub fn default_registry(include_review_tools: bool) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(shell::shell_tool());
    registry.register(files::view_tool());
    registry.register(search::grep_tool());
    registry.register(files::apply_patch_tool());
    registry.register(files::str_replace_edit_tool());
    registry.register(shell::install_dependencies_tool());
    registry.register(web::get_url_content_tool());
    registry.register(search::search_document_tool());
    registry.register(notes::scratchpad_tool());
    registry.register(plan::update_plan_tool());
    registry.register(plan::mark_task_completed_tool());
    registry.register(plan::mark_task_not_completed_tool());
    registry.register(notes::write_technical_notes_tool());
    registry.register(plan::request_human_help_tool());
    registry.register(plan::open_pr_tool());
    registry.register(files::write_default_tsconfig_tool());
    registry.register(plan::session_plan_tool());

    if include_review_tools {
        for tool in plan::review_reply_tools() {
            registry.register(tool);
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_the_core_set() {
        let registry = default_registry(false);
        for name in [
            "shell",
            "grep",
            "view",
            "apply_patch",
            "str_replace_based_edit_tool",
            "install_dependencies",
            "get_url_content",
            "search_document_for",
            "scratchpad",
            "update_plan",
            "mark_task_completed",
            "mark_task_not_completed",
            "write_technical_notes",
            "request_human_help",
            "open_pr",
            "write_default_tsconfig",
            "session_plan",
        ] {
            assert!(registry.contains(name), "missing tool {name}");
        }
        assert!(!registry.contains("reply_to_review"));
    }

    #[test]
    fn review_tools_are_context_gated() {
        let registry = default_registry(true);
        assert!(registry.contains("reply_to_comment"));
        assert!(registry.contains("reply_to_review_comment"));
        assert!(registry.contains("reply_to_review"));
    }
}
