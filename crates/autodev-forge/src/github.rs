//! GitHub-shaped forge client.
//!
//! Thin, retry-free request layer over the tracking and hosting REST
//! surfaces. Every non-2xx response becomes a typed
//! `AutodevError::RemoteService`; retry policy belongs to the orchestrator.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use autodev_core::domain::{
    AutodevError, ChangeRequest, CheckConclusion, CheckRun, CheckRunStatus, Result, WorkItem,
};
use autodev_core::forge::ForgeApi;

/// Repository coordinates and credentials for the forge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// REST API root, e.g. `https://api.github.com`.
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    /// Bearer token (optional for read-only use against public repos).
    pub token: Option<String>,
    /// Branch change requests merge into.
    pub base_branch: String,
    /// Label pair backing the selection query.
    pub trigger_label: String,
    pub in_progress_label: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        ForgeConfig {
            api_base: std::env::var("AUTODEV_FORGE_API")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            owner: std::env::var("AUTODEV_REPO_OWNER")
                .unwrap_or_else(|_| "autodev-org".to_string()),
            repo: std::env::var("AUTODEV_REPO_NAME")
                .unwrap_or_else(|_| "autodev-demo".to_string()),
            token: std::env::var("GITHUB_TOKEN").ok(),
            base_branch: std::env::var("AUTODEV_BASE_BRANCH")
                .unwrap_or_else(|_| "main".to_string()),
            trigger_label: std::env::var("AUTODEV_TRIGGER_LABEL")
                .unwrap_or_else(|_| "ai:dev".to_string()),
            in_progress_label: std::env::var("AUTODEV_IN_PROGRESS_LABEL")
                .unwrap_or_else(|_| "ai:in-progress".to_string()),
        }
    }
}

impl ForgeConfig {
    /// Create a config from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for a specific repository.
    pub fn new(owner: &str, repo: &str) -> Self {
        ForgeConfig {
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: None,
            ..Self::default()
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SearchDto {
    items: Vec<IssueDto>,
}

#[derive(Deserialize)]
struct IssueDto {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<LabelDto>,
    #[serde(default)]
    html_url: String,
}

#[derive(Deserialize)]
struct LabelDto {
    name: String,
}

#[derive(Deserialize)]
struct RefDto {
    object: RefObjectDto,
}

#[derive(Deserialize)]
struct RefObjectDto {
    sha: String,
}

#[derive(Deserialize)]
struct ContentDto {
    sha: String,
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpsertDto {
    commit: CommitDto,
}

#[derive(Deserialize)]
struct CommitDto {
    sha: String,
}

#[derive(Deserialize)]
struct PullDto {
    number: u64,
    html_url: String,
    head: PullHeadDto,
}

#[derive(Deserialize)]
struct PullHeadDto {
    sha: String,
}

#[derive(Deserialize)]
struct CheckRunsDto {
    #[serde(default)]
    check_runs: Vec<CheckRunDto>,
}

#[derive(Deserialize)]
struct CheckRunDto {
    name: String,
    status: String,
    conclusion: Option<String>,
}

impl From<IssueDto> for WorkItem {
    fn from(dto: IssueDto) -> Self {
        WorkItem {
            number: dto.number,
            title: dto.title,
            body: dto.body.unwrap_or_default(),
            labels: dto.labels.into_iter().map(|l| l.name).collect(),
            html_url: dto.html_url,
        }
    }
}

/// Map a wire check run into the domain type. Unknown execution statuses
/// count as still running, unknown conclusions as neutral; both keep the
/// aggregate non-terminal rather than inventing a verdict.
fn parse_check_run(dto: CheckRunDto) -> CheckRun {
    let status = match dto.status.as_str() {
        "completed" => CheckRunStatus::Completed,
        "queued" => CheckRunStatus::Queued,
        _ => CheckRunStatus::InProgress,
    };
    let conclusion = dto.conclusion.as_deref().map(|c| match c {
        "success" => CheckConclusion::Success,
        "failure" => CheckConclusion::Failure,
        "cancelled" => CheckConclusion::Cancelled,
        "timed_out" => CheckConclusion::TimedOut,
        "action_required" => CheckConclusion::ActionRequired,
        "skipped" => CheckConclusion::Skipped,
        _ => CheckConclusion::Neutral,
    });
    CheckRun {
        name: dto.name,
        status,
        conclusion,
    }
}

/// Decode contents-API base64, which arrives newline-wrapped.
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| AutodevError::Transport(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AutodevError::Transport(format!("non-utf8 content: {e}")))
}

/// Body of a contents-API upsert. Includes the blob SHA only when updating
/// an existing file, which is what makes the call conflict-safe.
fn upsert_payload(
    message: &str,
    content: &str,
    branch: &str,
    revision: Option<&str>,
) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "message": message,
        "content": BASE64.encode(content.as_bytes()),
        "branch": branch,
    });
    if let Some(sha) = revision {
        payload["sha"] = serde_json::Value::String(sha.to_string());
    }
    payload
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Forge client over a GitHub-shaped REST API.
pub struct GithubForge {
    config: ForgeConfig,
    http: reqwest::Client,
}

impl GithubForge {
    pub fn new(config: ForgeConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("autodev/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        GithubForge { config, http }
    }

    /// Create client from environment variables.
    pub fn from_env() -> Self {
        Self::new(ForgeConfig::from_env())
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_base, self.config.owner, self.config.repo, path
        )
    }

    /// Selection query: repo-scoped, open, trigger present, lease absent.
    fn selection_query(&self) -> String {
        format!(
            "repo:{}/{} is:issue is:open label:\"{}\" -label:\"{}\"",
            self.config.owner, self.config.repo, self.config.trigger_label,
            self.config.in_progress_label
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut request = request.header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AutodevError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AutodevError::RemoteService {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| AutodevError::Transport(e.to_string()))
    }

    /// Blob SHA of `path` at `branch`, if the file exists there.
    async fn file_revision(&self, branch: &str, path: &str) -> Result<Option<String>> {
        let url = self.repo_url(&format!("/contents/{path}"));
        let result = self.send(self.http.get(&url).query(&[("ref", branch)])).await;
        match result {
            Ok(response) => {
                let dto: ContentDto = Self::read_json(response).await?;
                Ok(Some(dto.sha))
            }
            Err(AutodevError::RemoteService { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ForgeApi for GithubForge {
    async fn find_candidates(&self) -> Result<Vec<WorkItem>> {
        let url = format!("{}/search/issues", self.config.api_base);
        let query = self.selection_query();
        debug!(event = "forge.search", query = %query);
        let response = self
            .send(
                self.http
                    .get(&url)
                    .query(&[("q", query.as_str()), ("per_page", "5")]),
            )
            .await?;
        let dto: SearchDto = Self::read_json(response).await?;
        Ok(dto.items.into_iter().map(WorkItem::from).collect())
    }

    async fn add_labels(&self, number: u64, labels: &[&str]) -> Result<()> {
        let url = self.repo_url(&format!("/issues/{number}/labels"));
        self.send(
            self.http
                .post(&url)
                .json(&serde_json::json!({ "labels": labels })),
        )
        .await?;
        Ok(())
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        self.send(self.http.post(&url).json(&serde_json::json!({ "body": body })))
            .await?;
        Ok(())
    }

    async fn get_branch_head(&self, branch: &str) -> Result<String> {
        let url = self.repo_url(&format!("/git/ref/heads/{branch}"));
        let response = self.send(self.http.get(&url)).await?;
        let dto: RefDto = Self::read_json(response).await?;
        Ok(dto.object.sha)
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<()> {
        let url = self.repo_url("/git/refs");
        self.send(self.http.post(&url).json(&serde_json::json!({
            "ref": format!("refs/heads/{name}"),
            "sha": from_sha,
        })))
        .await?;
        Ok(())
    }

    async fn upsert_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        let revision = self.file_revision(branch, path).await?;
        debug!(
            event = "forge.upsert",
            path = %path,
            branch = %branch,
            exists = revision.is_some(),
        );
        let url = self.repo_url(&format!("/contents/{path}"));
        let payload = upsert_payload(message, content, branch, revision.as_deref());
        let response = self.send(self.http.put(&url).json(&payload)).await?;
        let dto: UpsertDto = Self::read_json(response).await?;
        Ok(dto.commit.sha)
    }

    async fn create_change_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<ChangeRequest> {
        let url = self.repo_url("/pulls");
        let response = self
            .send(self.http.post(&url).json(&serde_json::json!({
                "title": title,
                "head": branch,
                "base": self.config.base_branch,
                "body": body,
            })))
            .await?;
        let dto: PullDto = Self::read_json(response).await?;
        Ok(ChangeRequest {
            number: dto.number,
            url: dto.html_url,
            head_sha: dto.head.sha,
        })
    }

    async fn find_open_change_request(&self, branch: &str) -> Result<Option<ChangeRequest>> {
        let url = self.repo_url("/pulls");
        let head = format!("{}:{}", self.config.owner, branch);
        let response = self
            .send(
                self.http
                    .get(&url)
                    .query(&[("state", "open"), ("head", head.as_str()), ("per_page", "1")]),
            )
            .await?;
        let pulls: Vec<PullDto> = Self::read_json(response).await?;
        Ok(pulls.into_iter().next().map(|dto| ChangeRequest {
            number: dto.number,
            url: dto.html_url,
            head_sha: dto.head.sha,
        }))
    }

    async fn get_check_status(&self, sha: &str) -> Result<Vec<CheckRun>> {
        let url = self.repo_url(&format!("/commits/{sha}/check-runs"));
        let response = self
            .send(self.http.get(&url).query(&[("per_page", "50")]))
            .await?;
        let dto: CheckRunsDto = Self::read_json(response).await?;
        Ok(dto.check_runs.into_iter().map(parse_check_run).collect())
    }

    async fn get_file(&self, path: &str, reference: &str) -> Result<String> {
        let url = self.repo_url(&format!("/contents/{path}"));
        let response = self
            .send(self.http.get(&url).query(&[("ref", reference)]))
            .await?;
        let dto: ContentDto = Self::read_json(response).await?;
        let encoded = dto.content.ok_or_else(|| {
            AutodevError::Transport(format!("contents response for {path} had no content field"))
        })?;
        decode_content(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forge_config_default() {
        let config = ForgeConfig::default();
        assert!(!config.api_base.is_empty());
        assert!(!config.owner.is_empty());
        assert_eq!(config.trigger_label, "ai:dev");
    }

    #[test]
    fn test_forge_config_new_and_token() {
        let config = ForgeConfig::new("octo", "widgets").with_token("secret-token");
        assert_eq!(config.owner, "octo");
        assert_eq!(config.repo, "widgets");
        assert_eq!(config.token, Some("secret-token".to_string()));
    }

    #[test]
    fn test_selection_query_shape() {
        let forge = GithubForge::new(ForgeConfig::new("octo", "widgets"));
        let q = forge.selection_query();
        assert_eq!(
            q,
            "repo:octo/widgets is:issue is:open label:\"ai:dev\" -label:\"ai:in-progress\""
        );
    }

    #[test]
    fn test_repo_url_composition() {
        let forge = GithubForge::new(ForgeConfig::new("octo", "widgets"));
        assert_eq!(
            forge.repo_url("/issues/7/labels"),
            "https://api.github.com/repos/octo/widgets/issues/7/labels"
        );
    }

    #[test]
    fn test_parse_check_run_mappings() {
        let run = parse_check_run(CheckRunDto {
            name: "tests".to_string(),
            status: "completed".to_string(),
            conclusion: Some("timed_out".to_string()),
        });
        assert_eq!(run.status, CheckRunStatus::Completed);
        assert_eq!(run.conclusion, Some(CheckConclusion::TimedOut));

        let run = parse_check_run(CheckRunDto {
            name: "build".to_string(),
            status: "waiting".to_string(),
            conclusion: None,
        });
        assert_eq!(run.status, CheckRunStatus::InProgress);
        assert_eq!(run.conclusion, None);

        let run = parse_check_run(CheckRunDto {
            name: "scan".to_string(),
            status: "completed".to_string(),
            conclusion: Some("startup_failure".to_string()),
        });
        assert_eq!(run.conclusion, Some(CheckConclusion::Neutral));
    }

    #[test]
    fn test_decode_content_handles_wrapped_base64() {
        // "hello autodev\n" encoded, wrapped the way the contents API wraps.
        let encoded = "aGVsbG8g\nYXV0b2Rl\ndgo=\n";
        assert_eq!(decode_content(encoded).expect("decode"), "hello autodev\n");
    }

    #[test]
    fn test_decode_content_rejects_garbage() {
        assert!(decode_content("!!not-base64!!").is_err());
    }

    #[test]
    fn test_upsert_payload_includes_revision_only_when_updating() {
        let created = upsert_payload("msg", "body", "ai/issue-1", None);
        assert!(created.get("sha").is_none());
        assert_eq!(created["branch"], "ai/issue-1");
        assert_eq!(created["content"], BASE64.encode(b"body"));

        let updated = upsert_payload("msg", "body", "ai/issue-1", Some("blob-7"));
        assert_eq!(updated["sha"], "blob-7");
    }
}
