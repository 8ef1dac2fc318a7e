//! Backend-agnostic contract for the tracking/hosting forge.
//!
//! One trait covers both external REST surfaces the orchestrator consumes:
//! the change-tracking service (issues, labels, comments, search) and the
//! version-control hosting service (branches, file contents, change
//! requests, check runs). Implementations are thin and retry-free; a
//! non-success response surfaces as `AutodevError::RemoteService` and retry
//! policy stays with the orchestrator. An in-memory fake is provided for
//! testing via the `fakes` module.

use async_trait::async_trait;

use crate::domain::{ChangeRequest, CheckRun, Result, WorkItem};

/// Synchronous request layer over the tracking and hosting services.
#[async_trait]
pub trait ForgeApi: Send + Sync {
    /// Search for claimable work items: repo-scoped, open, trigger label
    /// present, in-progress label absent. First page, small page size;
    /// ordering is whatever the tracker returns.
    async fn find_candidates(&self) -> Result<Vec<WorkItem>>;

    /// Append labels to a work item. Never removes existing labels.
    async fn add_labels(&self, number: u64, labels: &[&str]) -> Result<()>;

    /// Post a plain-text comment on a work item.
    async fn post_comment(&self, number: u64, body: &str) -> Result<()>;

    /// Resolve a branch name to its current head commit SHA.
    async fn get_branch_head(&self, branch: &str) -> Result<String>;

    /// Create a new branch pointing at the given commit.
    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<()>;

    /// Create or update one file on a branch, returning the SHA of the
    /// resulting commit.
    ///
    /// Must be idempotent: implementations read the file's current revision
    /// token first and update with it when present, so re-attempts never
    /// fail with lost-update conflicts.
    async fn upsert_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String>;

    /// Open a change request from `branch` into the base branch.
    async fn create_change_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<ChangeRequest>;

    /// Locate the open change request whose head is exactly `branch`.
    /// The returned head SHA reflects the branch tip at lookup time.
    async fn find_open_change_request(&self, branch: &str) -> Result<Option<ChangeRequest>>;

    /// Fetch all check runs reported for a commit.
    async fn get_check_status(&self, sha: &str) -> Result<Vec<CheckRun>>;

    /// Read one file's decoded content at a ref (branch name or SHA).
    async fn get_file(&self, path: &str, reference: &str) -> Result<String>;
}
