//! Check-run status aggregation for one commit.
//!
//! The CI system reports a set of check runs per commit; the orchestrator
//! only ever acts on the tri-state aggregate derived here. The aggregate is
//! computed fresh on every poll and never cached across commits.

use serde::{Deserialize, Serialize};

/// Execution status of a single check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
}

/// Conclusion of a completed check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
    Cancelled,
    TimedOut,
    ActionRequired,
    Neutral,
    Skipped,
}

impl CheckConclusion {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckConclusion::Success => "success",
            CheckConclusion::Failure => "failure",
            CheckConclusion::Cancelled => "cancelled",
            CheckConclusion::TimedOut => "timed_out",
            CheckConclusion::ActionRequired => "action_required",
            CheckConclusion::Neutral => "neutral",
            CheckConclusion::Skipped => "skipped",
        }
    }

    /// Conclusions that force the aggregate to `Failure`.
    fn is_failing(self) -> bool {
        matches!(
            self,
            CheckConclusion::Failure
                | CheckConclusion::Cancelled
                | CheckConclusion::TimedOut
                | CheckConclusion::ActionRequired
        )
    }
}

/// One check run as reported by the CI system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    pub status: CheckRunStatus,
    /// Present only once the run has completed.
    pub conclusion: Option<CheckConclusion>,
}

impl CheckRun {
    pub fn completed(name: impl Into<String>, conclusion: CheckConclusion) -> Self {
        Self {
            name: name.into(),
            status: CheckRunStatus::Completed,
            conclusion: Some(conclusion),
        }
    }

    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckRunStatus::InProgress,
            conclusion: None,
        }
    }
}

/// Tri-state aggregate over all check runs for one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiState {
    Pending,
    Success,
    Failure,
}

/// Aggregate a set of check runs into the tri-state result.
///
/// Rules, in precedence order:
/// - no reported runs at all -> `Pending`
/// - any run still queued or in progress -> `Pending`, regardless of the
///   conclusions of the others
/// - any completed run with a failing conclusion (failure, cancelled,
///   timed out, action required) -> `Failure`
/// - every completed run concluded `success` -> `Success`
/// - otherwise (neutral-class conclusions) -> `Pending`; the poll loop keeps
///   going until its budget runs out
pub fn aggregate_checks(runs: &[CheckRun]) -> CiState {
    if runs.is_empty() {
        return CiState::Pending;
    }
    if runs.iter().any(|r| r.status != CheckRunStatus::Completed) {
        return CiState::Pending;
    }
    if runs
        .iter()
        .any(|r| r.conclusion.is_some_and(CheckConclusion::is_failing))
    {
        return CiState::Failure;
    }
    if runs
        .iter()
        .all(|r| r.conclusion == Some(CheckConclusion::Success))
    {
        return CiState::Success;
    }
    CiState::Pending
}

/// Summarize every non-success run as `name=conclusion`, comma-joined.
///
/// Feeds the generation retry as structured failure feedback. An empty run
/// list yields `unknown`.
pub fn failure_summary(runs: &[CheckRun]) -> String {
    if runs.is_empty() {
        return "unknown".to_string();
    }
    let parts: Vec<String> = runs
        .iter()
        .filter(|r| r.conclusion != Some(CheckConclusion::Success))
        .map(|r| {
            let conclusion = r.conclusion.map_or("pending", CheckConclusion::as_str);
            format!("{}={}", r.name, conclusion)
        })
        .collect();
    if parts.is_empty() {
        "unknown".to_string()
    } else {
        parts.join(", ")
    }
}
