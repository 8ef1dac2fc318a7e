//! Explicit run configuration for the orchestrator.
//!
//! Everything that was ambient process state in earlier incarnations of
//! this tool (labels, repo coordinates, retry budget) is carried in one
//! struct that is handed to every component, so the orchestrator stays
//! testable against fakes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Budget and cadence of the CI poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of status queries before giving up.
    pub max_polls: u32,

    /// Sleep between queries.
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_polls: 30,
            interval: Duration::from_secs(20),
        }
    }
}

/// Orchestrator-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Label that marks a work item as requested for automation.
    pub trigger_label: String,

    /// Advisory lease label added at claim time, never removed.
    pub in_progress_label: String,

    /// Terminal label for a successful run.
    pub done_label: String,

    /// Terminal label for a blocked run.
    pub blocked_label: String,

    /// Branch change requests merge into, and the ref context is read from.
    pub base_branch: String,

    /// Prefix for per-issue working branches.
    pub branch_prefix: String,

    /// Total generation attempts per run, including the first.
    pub max_attempts: u32,

    /// Repo-relative paths fetched from the base branch as generation
    /// context: the product source under test, its test file, and the
    /// dependency manifest.
    pub context_paths: Vec<String>,

    /// Base URL the deployment-preview reference is derived from.
    pub preview_base_url: String,

    pub poll: PollConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            trigger_label: "ai:dev".to_string(),
            in_progress_label: "ai:in-progress".to_string(),
            done_label: "ai:done".to_string(),
            blocked_label: "ai:blocked".to_string(),
            base_branch: "main".to_string(),
            branch_prefix: "ai/issue-".to_string(),
            max_attempts: 2,
            context_paths: vec![
                "app/main.py".to_string(),
                "tests/test_smoke.py".to_string(),
                "requirements.txt".to_string(),
            ],
            preview_base_url: "https://preview.autodev.local".to_string(),
            poll: PollConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Build a config from `AUTODEV_*` environment variables, falling back
    /// to the defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trigger_label: env_or("AUTODEV_TRIGGER_LABEL", defaults.trigger_label),
            in_progress_label: env_or("AUTODEV_IN_PROGRESS_LABEL", defaults.in_progress_label),
            done_label: env_or("AUTODEV_DONE_LABEL", defaults.done_label),
            blocked_label: env_or("AUTODEV_BLOCKED_LABEL", defaults.blocked_label),
            base_branch: env_or("AUTODEV_BASE_BRANCH", defaults.base_branch),
            branch_prefix: env_or("AUTODEV_BRANCH_PREFIX", defaults.branch_prefix),
            max_attempts: std::env::var("AUTODEV_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            context_paths: std::env::var("AUTODEV_CONTEXT_PATHS")
                .map(|v| {
                    v.split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.context_paths),
            preview_base_url: env_or("AUTODEV_PREVIEW_BASE", defaults.preview_base_url),
            poll: PollConfig {
                max_polls: std::env::var("AUTODEV_CI_MAX_POLLS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.poll.max_polls),
                interval: std::env::var("AUTODEV_CI_POLL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.poll.interval),
            },
        }
    }

    /// Deterministic working branch for an issue: `<prefix><number>`.
    pub fn branch_for(&self, issue: u64) -> String {
        format!("{}{}", self.branch_prefix, issue)
    }

    /// Deterministic deployment-preview reference for a change request.
    pub fn preview_url(&self, change_request: u64) -> String {
        format!(
            "{}/pr-{}",
            self.preview_base_url.trim_end_matches('/'),
            change_request
        )
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.trigger_label, "ai:dev");
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.poll.max_polls, 30);
        assert_eq!(config.poll.interval, Duration::from_secs(20));
        assert_eq!(config.context_paths.len(), 3);
    }

    #[test]
    fn test_branch_for_issue() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.branch_for(42), "ai/issue-42");
    }

    #[test]
    fn test_preview_url_is_deterministic_in_pr_number() {
        let mut config = OrchestratorConfig::default();
        config.preview_base_url = "https://previews.example.dev/".to_string();
        assert_eq!(config.preview_url(9), "https://previews.example.dev/pr-9");
        assert_eq!(config.preview_url(9), config.preview_url(9));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = OrchestratorConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: OrchestratorConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }
}
