//! Application configuration
//!
//! Env-driven configuration for the orchestrator: app identity, sandbox
//! snapshot, trigger labels, and the knobs the agent graphs read (token
//! ceiling, review budget, local mode). Host-auth material (private keys,
//! cookies, bearer tokens) belongs to the web edge and never reaches the
//! core.

use crate::error::{OrchestratorError, Result};
use std::env;

/// Issue labels that trigger a manager run (production spellings)
pub const TRIGGER_LABELS: &[&str] = &[
    "open-swe",
    "open-swe-auto",
    "open-swe-max",
    "open-swe-max-auto",
];

/// Suffix appended to trigger labels outside production
pub const DEV_LABEL_SUFFIX: &str = "-dev";

/// Options encoded by the trigger label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerOptions {
    /// Auto-approve the proposed plan (`-auto` labels)
    pub auto_accept_plan: bool,

    /// Use the most capable planner/programmer models (`-max` labels)
    pub max_models: bool,
}

/// Orchestrator configuration, normally read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// App identity: names the bot commit author and the trigger labels'
    /// owner (`APP_NAME`)
    pub app_name: String,

    pub sandbox_snapshot_name: String,

    /// Personal access token; when present, installation token regeneration
    /// is skipped
    pub github_pat: Option<String>,

    pub local_mode: bool,
    pub production: bool,

    /// Base URL of the app, linked from PR comments
    pub app_url: String,

    pub git_host: String,
    pub skip_ci: bool,

    /// Reviewer loops allowed before concluding regardless
    pub max_review_count: u32,

    /// Internal-message token ceiling that triggers summarization
    pub max_internal_tokens: usize,

    /// Model family used for token approximation
    pub token_model: String,
}

impl AppConfig {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            app_name: require("APP_NAME")?,
            sandbox_snapshot_name: require("SANDBOX_SNAPSHOT_NAME")?,
            github_pat: optional("GITHUB_PAT"),
            local_mode: flag("LOCAL_MODE"),
            production: flag("PRODUCTION"),
            app_url: optional("APP_URL").unwrap_or_else(|| "https://patchwork.dev".into()),
            git_host: optional("GIT_HOST").unwrap_or_else(|| "github.com".into()),
            skip_ci: flag("SKIP_CI"),
            max_review_count: optional("MAX_REVIEW_COUNT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            max_internal_tokens: optional("MAX_INTERNAL_TOKENS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(60_000),
            token_model: optional("TOKEN_MODEL").unwrap_or_else(|| "claude".into()),
        })
    }

    /// Minimal configuration for tests and local runs.
    pub fn for_tests() -> Self {
        Self {
            app_name: "patchwork".into(),
            sandbox_snapshot_name: "test-snapshot".into(),
            github_pat: None,
            local_mode: false,
            production: false,
            app_url: "https://patchwork.test".into(),
            git_host: "github.com".into(),
            skip_ci: false,
            max_review_count: 3,
            max_internal_tokens: 60_000,
            token_model: "claude".into(),
        }
    }

    /// Trigger labels for this environment (`-dev` suffixed outside
    /// production).
    pub fn trigger_labels(&self) -> Vec<String> {
        TRIGGER_LABELS
            .iter()
            .map(|label| {
                if self.production {
                    (*label).to_string()
                } else {
                    format!("{label}{DEV_LABEL_SUFFIX}")
                }
            })
            .collect()
    }

    /// Options encoded by a trigger label; `None` when the label does not
    /// trigger runs in this environment.
    pub fn trigger_options(&self, label: &str) -> Option<TriggerOptions> {
        let base = if self.production {
            label
        } else {
            label.strip_suffix(DEV_LABEL_SUFFIX)?
        };
        if !TRIGGER_LABELS.contains(&base) {
            return None;
        }
        Some(TriggerOptions {
            auto_accept_plan: base.ends_with("-auto"),
            max_models: base.contains("-max"),
        })
    }

    /// First trigger option found on an issue's labels.
    pub fn trigger_from_labels(&self, labels: &[String]) -> Option<TriggerOptions> {
        labels
            .iter()
            .find_map(|label| self.trigger_options(label))
    }

    /// Branch name for work on an issue.
    pub fn branch_name_for_issue(&self, issue_number: u64) -> String {
        format!("{}/issue-{issue_number}", self.app_name)
    }
}

fn require(key: &str) -> Result<String> {
    env::var(key).map_err(|_| OrchestratorError::Configuration(format!("missing env var {key}")))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn flag(key: &str) -> bool {
    matches!(
        env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_labels_are_suffixed() {
        let config = AppConfig::for_tests();
        assert!(config.trigger_labels().contains(&"open-swe-dev".to_string()));
        assert!(config.trigger_options("open-swe").is_none());
        assert!(config.trigger_options("open-swe-dev").is_some());
    }

    #[test]
    fn production_labels_are_bare() {
        let mut config = AppConfig::for_tests();
        config.production = true;
        assert!(config.trigger_options("open-swe").is_some());
        assert!(config.trigger_options("open-swe-dev").is_none());
    }

    #[test]
    fn label_options_decode_auto_and_max() {
        let mut config = AppConfig::for_tests();
        config.production = true;

        let auto = config.trigger_options("open-swe-auto").unwrap();
        assert!(auto.auto_accept_plan);
        assert!(!auto.max_models);

        let max = config.trigger_options("open-swe-max").unwrap();
        assert!(!max.auto_accept_plan);
        assert!(max.max_models);

        let both = config.trigger_options("open-swe-max-auto").unwrap();
        assert!(both.auto_accept_plan);
        assert!(both.max_models);

        let plain = config.trigger_options("open-swe").unwrap();
        assert_eq!(plain, TriggerOptions::default());
    }

    #[test]
    fn unrelated_labels_do_not_trigger() {
        let mut config = AppConfig::for_tests();
        config.production = true;
        assert!(config.trigger_options("bug").is_none());
        assert!(config
            .trigger_from_labels(&["bug".into(), "open-swe-auto".into()])
            .unwrap()
            .auto_accept_plan);
    }
}
