//! In-memory fakes for the collaborator seams (testing only)
//!
//! Provides `FakeForge` and `ScriptedBackend` that satisfy the trait
//! contracts without any network access. State lives behind mutexes so the
//! fakes can be shared by reference with the orchestrator.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{AutodevError, ChangeRequest, CheckRun, Result, WorkItem};
use crate::forge::ForgeApi;
use crate::generate::CompletionBackend;

// ---------------------------------------------------------------------------
// FakeForge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeChangeRequest {
    number: u64,
    branch: String,
    open: bool,
}

#[derive(Debug, Default)]
struct ForgeState {
    issues: Vec<WorkItem>,
    added_labels: HashMap<u64, Vec<String>>,
    comments: HashMap<u64, Vec<String>>,
    branches: HashMap<String, String>,
    files: HashMap<(String, String), String>,
    commit_messages: Vec<String>,
    change_requests: Vec<FakeChangeRequest>,
    check_scripts: HashMap<String, VecDeque<Vec<CheckRun>>>,
    check_queries: HashMap<String, u32>,
    branch_creations: usize,
    commit_counter: u64,
    next_change_request: u64,
    comment_poison: Option<u16>,
}

/// In-memory forge modelling a repository with branches, file trees, change
/// requests, and scripted per-commit check-run sequences.
pub struct FakeForge {
    trigger_label: String,
    in_progress_label: String,
    state: Mutex<ForgeState>,
}

impl Default for FakeForge {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeForge {
    /// A forge whose base branch `main` exists at head `base-0`, with the
    /// default selection-query labels.
    pub fn new() -> Self {
        let mut state = ForgeState {
            next_change_request: 100,
            ..ForgeState::default()
        };
        state
            .branches
            .insert("main".to_string(), "base-0".to_string());
        Self {
            trigger_label: "ai:dev".to_string(),
            in_progress_label: "ai:in-progress".to_string(),
            state: Mutex::new(state),
        }
    }

    // -- seeding -----------------------------------------------------------

    pub fn add_issue(&self, item: WorkItem) {
        self.state.lock().unwrap().issues.push(item);
    }

    /// Seed one file on a branch without minting a commit.
    pub fn seed_file(&self, branch: &str, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert((branch.to_string(), path.to_string()), content.to_string());
    }

    /// Script successive check-status answers for one commit. The last
    /// entry repeats once the script is exhausted.
    pub fn script_checks(&self, sha: &str, polls: Vec<Vec<CheckRun>>) {
        self.state
            .lock()
            .unwrap()
            .check_scripts
            .insert(sha.to_string(), polls.into());
    }

    /// Make every subsequent `post_comment` fail with the given status.
    pub fn poison_comments(&self, status: u16) {
        self.state.lock().unwrap().comment_poison = Some(status);
    }

    // -- assertions --------------------------------------------------------

    /// Labels on the item: snapshot labels plus everything added since.
    pub fn labels_for(&self, number: u64) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut labels: Vec<String> = state
            .issues
            .iter()
            .find(|i| i.number == number)
            .map(|i| i.labels.clone())
            .unwrap_or_default();
        if let Some(added) = state.added_labels.get(&number) {
            for label in added {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
        }
        labels
    }

    pub fn comments_for(&self, number: u64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .comments
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    pub fn branch_creations(&self) -> usize {
        self.state.lock().unwrap().branch_creations
    }

    pub fn branch_head(&self, branch: &str) -> Option<String> {
        self.state.lock().unwrap().branches.get(branch).cloned()
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(branch.to_string(), path.to_string()))
            .cloned()
    }

    pub fn last_commit_message(&self) -> Option<String> {
        self.state.lock().unwrap().commit_messages.last().cloned()
    }

    pub fn change_request_count(&self) -> usize {
        self.state.lock().unwrap().change_requests.len()
    }

    pub fn check_queries(&self, sha: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .check_queries
            .get(sha)
            .copied()
            .unwrap_or(0)
    }

    fn not_found(what: impl Into<String>) -> AutodevError {
        AutodevError::RemoteService {
            status: 404,
            message: what.into(),
        }
    }
}

#[async_trait]
impl ForgeApi for FakeForge {
    async fn find_candidates(&self) -> Result<Vec<WorkItem>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .issues
            .iter()
            .filter(|item| {
                let added = state.added_labels.get(&item.number);
                let has = |label: &str| {
                    item.has_label(label)
                        || added.is_some_and(|extra| extra.iter().any(|l| l == label))
                };
                has(&self.trigger_label) && !has(&self.in_progress_label)
            })
            .cloned()
            .collect())
    }

    async fn add_labels(&self, number: u64, labels: &[&str]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.added_labels.entry(number).or_default();
        for label in labels {
            if !entry.iter().any(|l| l == label) {
                entry.push((*label).to_string());
            }
        }
        Ok(())
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.comment_poison {
            return Err(AutodevError::RemoteService {
                status,
                message: "comment rejected".to_string(),
            });
        }
        state
            .comments
            .entry(number)
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn get_branch_head(&self, branch: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| Self::not_found(format!("no branch {branch}")))
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.branches.contains_key(name) {
            return Err(AutodevError::RemoteService {
                status: 422,
                message: format!("reference already exists: {name}"),
            });
        }
        // Give the new branch the file tree of whichever branch is at the
        // source commit, the way a real ref creation shares the tree.
        let source = state
            .branches
            .iter()
            .find(|(_, head)| head.as_str() == from_sha)
            .map(|(branch, _)| branch.clone());
        if let Some(source) = source {
            let copied: Vec<((String, String), String)> = state
                .files
                .iter()
                .filter(|((branch, _), _)| branch == &source)
                .map(|((_, path), content)| {
                    ((name.to_string(), path.clone()), content.clone())
                })
                .collect();
            state.files.extend(copied);
        }
        state.branches.insert(name.to_string(), from_sha.to_string());
        state.branch_creations += 1;
        Ok(())
    }

    async fn upsert_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if !state.branches.contains_key(branch) {
            return Err(Self::not_found(format!("no branch {branch}")));
        }
        state
            .files
            .insert((branch.to_string(), path.to_string()), content.to_string());
        state.commit_messages.push(message.to_string());
        state.commit_counter += 1;
        let sha = format!("sha-{}", state.commit_counter);
        state.branches.insert(branch.to_string(), sha.clone());
        Ok(sha)
    }

    async fn create_change_request(
        &self,
        branch: &str,
        _title: &str,
        _body: &str,
    ) -> Result<ChangeRequest> {
        let mut state = self.state.lock().unwrap();
        let head_sha = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| Self::not_found(format!("no branch {branch}")))?;
        state.next_change_request += 1;
        let number = state.next_change_request;
        state.change_requests.push(FakeChangeRequest {
            number,
            branch: branch.to_string(),
            open: true,
        });
        Ok(ChangeRequest {
            number,
            url: format!("https://forge.local/pr/{number}"),
            head_sha,
        })
    }

    async fn find_open_change_request(&self, branch: &str) -> Result<Option<ChangeRequest>> {
        let state = self.state.lock().unwrap();
        let found = state
            .change_requests
            .iter()
            .find(|cr| cr.open && cr.branch == branch);
        Ok(found.map(|cr| ChangeRequest {
            number: cr.number,
            url: format!("https://forge.local/pr/{}", cr.number),
            // The head tracks the branch tip, as on a real hosting service.
            head_sha: state.branches.get(branch).cloned().unwrap_or_default(),
        }))
    }

    async fn get_check_status(&self, sha: &str) -> Result<Vec<CheckRun>> {
        let mut state = self.state.lock().unwrap();
        *state.check_queries.entry(sha.to_string()).or_insert(0) += 1;
        let Some(script) = state.check_scripts.get_mut(sha) else {
            return Ok(Vec::new());
        };
        if script.len() > 1 {
            Ok(script.pop_front().unwrap_or_default())
        } else {
            Ok(script.front().cloned().unwrap_or_default())
        }
    }

    async fn get_file(&self, path: &str, reference: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(reference.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(format!("no file {path} at {reference}")))
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

enum ScriptedReply {
    Raw(String),
    Fail(String),
}

/// Completion backend that replays queued responses and records prompts.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, raw: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Raw(raw.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Fail(message.into()));
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// The user prompt of the n-th completion (0-based).
    pub fn prompt(&self, index: usize) -> Option<String> {
        self.prompts.lock().unwrap().get(index).cloned()
    }
}

#[async_trait]
impl CompletionBackend for &ScriptedBackend {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(ScriptedReply::Raw(raw)) => Ok(raw),
            Some(ScriptedReply::Fail(message)) => Err(AutodevError::Transport(message)),
            None => Err(AutodevError::Transport(
                "no scripted response queued".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_candidate_filtering_respects_query_labels() {
        let forge = FakeForge::new();
        forge.add_issue(WorkItem {
            number: 1,
            title: "eligible".to_string(),
            body: String::new(),
            labels: vec!["ai:dev".to_string()],
            html_url: String::new(),
        });
        forge.add_issue(WorkItem {
            number: 2,
            title: "claimed".to_string(),
            body: String::new(),
            labels: vec!["ai:dev".to_string(), "ai:in-progress".to_string()],
            html_url: String::new(),
        });

        let found = forge.find_candidates().await.expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].number, 1);

        // Claiming removes the item from subsequent searches.
        forge.add_labels(1, &["ai:in-progress"]).await.expect("label");
        assert!(forge.find_candidates().await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn test_branch_tree_copied_at_creation() {
        let forge = FakeForge::new();
        forge.seed_file("main", "app/main.py", "original");

        let head = forge.get_branch_head("main").await.expect("head");
        forge.create_branch("ai/issue-1", &head).await.expect("create");
        assert_eq!(
            forge.get_file("app/main.py", "ai/issue-1").await.expect("read"),
            "original"
        );
    }

    #[tokio::test]
    async fn test_check_script_last_entry_repeats() {
        let forge = FakeForge::new();
        forge.script_checks("sha-9", vec![vec![], vec![CheckRun::running("t")]]);

        assert!(forge.get_check_status("sha-9").await.expect("poll").is_empty());
        assert_eq!(forge.get_check_status("sha-9").await.expect("poll").len(), 1);
        assert_eq!(forge.get_check_status("sha-9").await.expect("poll").len(), 1);
        assert_eq!(forge.check_queries("sha-9"), 3);
    }

    #[tokio::test]
    async fn test_scripted_backend_replays_in_order() {
        let backend = ScriptedBackend::new();
        backend.push_response("one");
        backend.push_failure("boom");

        let handle = &backend;
        assert_eq!(handle.complete("s", "p1").await.expect("first"), "one");
        assert!(handle.complete("s", "p2").await.is_err());
        assert_eq!(backend.calls(), 2);
        assert_eq!(backend.prompt(0).as_deref(), Some("p1"));
    }
}
