//! Branch and change-request delivery over a forge backend.
//!
//! Owns the causally ordered middle of a run: branch creation precedes file
//! application, which precedes change-request creation or lookup. Each step
//! feeds the identifier the next one needs, so nothing here is reordered or
//! parallelized.

use crate::config::OrchestratorConfig;
use crate::domain::{AutodevError, ChangeRequest, EditSet, Result};
use crate::forge::ForgeApi;

/// Applies validated edit sets to a per-issue working branch and opens or
/// locates the associated change request.
pub struct ChangeDelivery<'a, F> {
    forge: &'a F,
    config: &'a OrchestratorConfig,
    branch_created: bool,
}

impl<'a, F: ForgeApi> ChangeDelivery<'a, F> {
    pub fn new(forge: &'a F, config: &'a OrchestratorConfig) -> Self {
        Self {
            forge,
            config,
            branch_created: false,
        }
    }

    /// Resolve the issue's working branch, creating it from the base
    /// branch's current head the first time this run needs it. Later
    /// attempts in the same run reuse the branch as-is.
    pub async fn ensure_branch(&mut self, issue: u64) -> Result<String> {
        let branch = self.config.branch_for(issue);
        if !self.branch_created {
            let base_sha = self.forge.get_branch_head(&self.config.base_branch).await?;
            self.forge.create_branch(&branch, &base_sha).await?;
            self.branch_created = true;
            tracing::info!(event = "branch.created", branch = %branch, from = %base_sha);
        }
        Ok(branch)
    }

    /// Upsert every edit onto the branch, one versioned update per file.
    /// Returns the applied paths in order.
    pub async fn apply(
        &self,
        branch: &str,
        edits: &EditSet,
        issue: u64,
        attempt: u32,
    ) -> Result<Vec<String>> {
        let mut applied = Vec::with_capacity(edits.len());
        for edit in &edits.edits {
            let message = format!(
                "AI: update {} for issue #{issue} (attempt {attempt})",
                edit.path
            );
            self.forge
                .upsert_file(branch, &edit.path, &edit.content, &message)
                .await?;
            applied.push(edit.path.clone());
        }
        Ok(applied)
    }

    /// Attempt 1 opens a fresh change request; attempts beyond it must find
    /// the one already open for the branch. A missing request on a retry is
    /// fatal for the run and is never recreated.
    pub async fn open_or_locate(
        &self,
        branch: &str,
        attempt: u32,
        title: &str,
        body: &str,
    ) -> Result<ChangeRequest> {
        if attempt <= 1 {
            self.forge.create_change_request(branch, title, body).await
        } else {
            self.forge
                .find_open_change_request(branch)
                .await?
                .ok_or_else(|| AutodevError::MissingChangeRequest {
                    branch: branch.to_string(),
                })
        }
    }
}

/// Title for the change request: issue title plus its id.
pub fn change_request_title(issue: u64, issue_title: &str) -> String {
    format!("AI: {issue_title} (#{issue})")
}

/// Body for the change request: generation summary plus the changed paths.
pub fn change_request_body(issue: u64, summary: &str, paths: &[String]) -> String {
    let listed = paths
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Automated change for #{issue}.\n\n{summary}\n\nChanged paths:\n{listed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileEdit;
    use crate::fakes::FakeForge;

    fn one_edit() -> EditSet {
        EditSet {
            summary: "fix".to_string(),
            edits: vec![FileEdit {
                path: "app/main.py".to_string(),
                content: "def add(a, b): return a + b\n".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_branch_created_once_per_run() {
        let forge = FakeForge::new();
        let config = OrchestratorConfig::default();
        let mut delivery = ChangeDelivery::new(&forge, &config);

        let first = delivery.ensure_branch(42).await.expect("create");
        let second = delivery.ensure_branch(42).await.expect("reuse");
        assert_eq!(first, "ai/issue-42");
        assert_eq!(first, second);
        assert_eq!(forge.branch_creations(), 1);
    }

    #[tokio::test]
    async fn test_apply_upserts_each_edit_with_issue_and_attempt() {
        let forge = FakeForge::new();
        let config = OrchestratorConfig::default();
        let mut delivery = ChangeDelivery::new(&forge, &config);
        let branch = delivery.ensure_branch(42).await.expect("branch");

        let paths = delivery
            .apply(&branch, &one_edit(), 42, 2)
            .await
            .expect("apply");
        assert_eq!(paths, vec!["app/main.py".to_string()]);

        let message = forge.last_commit_message().expect("commit recorded");
        assert!(message.contains("#42"));
        assert!(message.contains("attempt 2"));
    }

    #[tokio::test]
    async fn test_upsert_twice_with_identical_content_is_a_noop_update() {
        let forge = FakeForge::new();
        let config = OrchestratorConfig::default();
        let mut delivery = ChangeDelivery::new(&forge, &config);
        let branch = delivery.ensure_branch(42).await.expect("branch");
        let edits = one_edit();

        delivery.apply(&branch, &edits, 42, 1).await.expect("first");
        delivery
            .apply(&branch, &edits, 42, 1)
            .await
            .expect("second apply of identical content must not error");

        assert_eq!(
            forge.file(&branch, "app/main.py").as_deref(),
            Some("def add(a, b): return a + b\n")
        );
    }

    #[tokio::test]
    async fn test_locate_on_retry_fails_without_open_request() {
        let forge = FakeForge::new();
        let config = OrchestratorConfig::default();
        let mut delivery = ChangeDelivery::new(&forge, &config);
        let branch = delivery.ensure_branch(42).await.expect("branch");

        let err = delivery
            .open_or_locate(&branch, 2, "t", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AutodevError::MissingChangeRequest { .. }));
    }

    #[tokio::test]
    async fn test_open_then_locate_same_request() {
        let forge = FakeForge::new();
        let config = OrchestratorConfig::default();
        let mut delivery = ChangeDelivery::new(&forge, &config);
        let branch = delivery.ensure_branch(42).await.expect("branch");

        let opened = delivery
            .open_or_locate(&branch, 1, "t", "b")
            .await
            .expect("open");
        let located = delivery
            .open_or_locate(&branch, 2, "t", "b")
            .await
            .expect("locate");
        assert_eq!(opened.number, located.number);
        assert_eq!(forge.change_request_count(), 1);
    }

    #[test]
    fn test_change_request_text_embeds_required_fields() {
        let title = change_request_title(42, "Fix add");
        assert!(title.contains("Fix add"));
        assert!(title.contains("#42"));

        let body = change_request_body(42, "summary text", &["a.py".to_string()]);
        assert!(body.contains("summary text"));
        assert!(body.contains("- a.py"));
    }
}
