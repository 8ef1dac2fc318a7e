//! Orchestration state machine for one run.
//!
//! Sequences claim -> generate -> validate -> apply -> open/locate -> poll
//! as an explicit state enum driven by a single transition loop; a retry
//! after a guardrail rejection or a third attempt has no representation.
//! One work item per invocation; continuation is the external scheduler's
//! job.

use std::collections::{BTreeMap, BTreeSet};

use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::delivery::{change_request_body, change_request_title, ChangeDelivery};
use crate::domain::{
    failure_summary, AutodevError, ChangeRequest, CiState, EditSet, Result, WorkItem,
};
use crate::forge::ForgeApi;
use crate::generate::{ChangeGenerator, CompletionBackend};
use crate::guardrails::{validate_edit_set, GuardrailViolation};
use crate::ledger::{EventLedger, RunEventKind};
use crate::poll::await_terminal;

/// Why a run ended blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The proposed edit set failed a safety rule. Never retried.
    Guardrail(GuardrailViolation),

    /// The poll budget ran out without a terminal CI result. Not treated
    /// as a generation fault, so no retry is spent on it.
    CiTimeout { polls: u32 },

    /// CI failed and the attempt budget is exhausted.
    CiFailure { attempts: u32 },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Guardrail(violation) => write!(f, "guardrail: {violation}"),
            BlockReason::CiTimeout { polls } => {
                write!(f, "ci timeout after {polls} polls")
            }
            BlockReason::CiFailure { attempts } => {
                write!(f, "ci failure after {attempts} attempts")
            }
        }
    }
}

/// Terminal result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing claimable matched the selection query.
    NoCandidates,

    Done {
        number: u64,
        change_request: u64,
        attempts: u32,
    },

    Blocked {
        number: u64,
        reason: BlockReason,
    },
}

/// Explicit run state. Each variant carries exactly the data its
/// transition needs; attempt indices travel with the state.
enum RunState {
    Generating {
        attempt: u32,
        feedback: Option<String>,
    },
    Validating {
        attempt: u32,
        edits: EditSet,
    },
    Applying {
        attempt: u32,
        edits: EditSet,
    },
    AwaitingCi {
        attempt: u32,
        change_request: ChangeRequest,
    },
    Retrying {
        attempt: u32,
        feedback: String,
    },
    Succeeded {
        attempt: u32,
        change_request: ChangeRequest,
    },
    Blocked {
        reason: BlockReason,
    },
}

/// Drives one work item from claim to a terminal disposition.
pub struct Orchestrator<'a, F, B> {
    forge: &'a F,
    generator: ChangeGenerator<B>,
    ledger: EventLedger,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl<'a, F: ForgeApi, B: CompletionBackend> Orchestrator<'a, F, B> {
    pub fn new(
        forge: &'a F,
        backend: B,
        ledger: EventLedger,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            forge,
            generator: ChangeGenerator::new(backend),
            ledger,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Install a token a host process can use to abort a stuck run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    /// Process at most one work item to a terminal disposition.
    ///
    /// A collaborator failure (network, malformed generation output,
    /// missing change request on retry) aborts immediately: it is recorded
    /// in the ledger and returned, and no further labels are touched.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        self.ledger.append(RunEventKind::RunStarted)?;
        match self.drive().await {
            Ok(outcome) => {
                self.ledger.append(RunEventKind::RunFinished)?;
                Ok(outcome)
            }
            Err(err) => {
                self.ledger.append(RunEventKind::CollaboratorFailure {
                    message: err.to_string(),
                })?;
                Err(err)
            }
        }
    }

    async fn drive(&self) -> Result<RunOutcome> {
        let Some(item) = self.claim().await? else {
            self.ledger.append(RunEventKind::NoCandidates)?;
            return Ok(RunOutcome::NoCandidates);
        };

        let branch = self.config.branch_for(item.number);
        let mut context = self.load_context().await?;
        let mut delivery = ChangeDelivery::new(self.forge, &self.config);
        let mut edited_paths: BTreeSet<String> = BTreeSet::new();

        let mut state = RunState::Generating {
            attempt: 1,
            feedback: None,
        };

        loop {
            state = match state {
                RunState::Generating { attempt, feedback } => {
                    let edits = self
                        .generator
                        .generate(&item.title, &item.body, &context, feedback.as_deref())
                        .await?;
                    self.ledger.append(RunEventKind::GenerationFinished {
                        number: item.number,
                        attempt,
                        summary: edits.summary.clone(),
                        files: edits.len(),
                    })?;
                    RunState::Validating { attempt, edits }
                }

                RunState::Validating { attempt, edits } => match validate_edit_set(&edits) {
                    Ok(()) => RunState::Applying { attempt, edits },
                    Err(violation) => {
                        self.forge
                            .post_comment(
                                item.number,
                                &format!("Guardrail rejected the proposed change: {violation}"),
                            )
                            .await?;
                        self.forge
                            .add_labels(item.number, &[&self.config.blocked_label])
                            .await?;
                        self.ledger.append(RunEventKind::GuardrailRejected {
                            number: item.number,
                            reason: violation.to_string(),
                        })?;
                        RunState::Blocked {
                            reason: BlockReason::Guardrail(violation),
                        }
                    }
                },

                RunState::Applying { attempt, edits } => {
                    let branch = delivery.ensure_branch(item.number).await?;
                    let paths = delivery.apply(&branch, &edits, item.number, attempt).await?;
                    self.ledger.append(RunEventKind::EditsApplied {
                        number: item.number,
                        attempt,
                        paths: paths.clone(),
                    })?;
                    edited_paths.extend(paths.iter().cloned());

                    let title = change_request_title(item.number, &item.title);
                    let body = change_request_body(item.number, &edits.summary, &paths);
                    let change_request = delivery
                        .open_or_locate(&branch, attempt, &title, &body)
                        .await?;
                    self.ledger.append(RunEventKind::ChangeRequestReady {
                        number: item.number,
                        change_request: change_request.number,
                        url: change_request.url.clone(),
                        head_sha: change_request.head_sha.clone(),
                        attempt,
                    })?;
                    if attempt == 1 {
                        self.forge
                            .post_comment(
                                item.number,
                                &format!("Opened change request: {}", change_request.url),
                            )
                            .await?;
                    }
                    RunState::AwaitingCi {
                        attempt,
                        change_request,
                    }
                }

                RunState::AwaitingCi {
                    attempt,
                    change_request,
                } => {
                    let outcome = await_terminal(
                        self.forge,
                        &change_request.head_sha,
                        &self.config.poll,
                        &self.cancel,
                    )
                    .await?;
                    self.ledger.append(RunEventKind::CiConcluded {
                        number: item.number,
                        attempt,
                        state: outcome.state,
                        polls_used: outcome.polls_used,
                    })?;

                    match outcome.state {
                        CiState::Success => {
                            self.forge
                                .post_comment(item.number, "CI result: **success**")
                                .await?;
                            let preview = self.config.preview_url(change_request.number);
                            self.forge
                                .post_comment(
                                    item.number,
                                    &format!("Deployment preview: {preview}"),
                                )
                                .await?;
                            self.forge
                                .add_labels(item.number, &[&self.config.done_label])
                                .await?;
                            RunState::Succeeded {
                                attempt,
                                change_request,
                            }
                        }
                        CiState::Pending => {
                            self.forge
                                .post_comment(
                                    item.number,
                                    &format!(
                                        "CI reached no terminal result within {} polls; giving up.",
                                        outcome.polls_used
                                    ),
                                )
                                .await?;
                            self.forge
                                .add_labels(item.number, &[&self.config.blocked_label])
                                .await?;
                            RunState::Blocked {
                                reason: BlockReason::CiTimeout {
                                    polls: outcome.polls_used,
                                },
                            }
                        }
                        CiState::Failure => {
                            self.forge
                                .post_comment(item.number, "CI result: **failure**")
                                .await?;
                            if attempt < self.config.max_attempts {
                                RunState::Retrying {
                                    attempt,
                                    feedback: failure_summary(&outcome.runs),
                                }
                            } else {
                                self.forge
                                    .add_labels(item.number, &[&self.config.blocked_label])
                                    .await?;
                                RunState::Blocked {
                                    reason: BlockReason::CiFailure { attempts: attempt },
                                }
                            }
                        }
                    }
                }

                RunState::Retrying { attempt, feedback } => {
                    // Refresh every previously edited path from the branch
                    // head so the next attempt sees its own prior edits.
                    for path in &edited_paths {
                        let content = self.forge.get_file(path, &branch).await?;
                        context.insert(path.clone(), content);
                    }
                    let next_attempt = attempt + 1;
                    self.ledger.append(RunEventKind::RetryScheduled {
                        number: item.number,
                        next_attempt,
                        feedback: feedback.clone(),
                    })?;
                    RunState::Generating {
                        attempt: next_attempt,
                        feedback: Some(feedback),
                    }
                }

                RunState::Succeeded {
                    attempt,
                    change_request,
                } => {
                    self.ledger.append(RunEventKind::RunSucceeded {
                        number: item.number,
                        change_request: change_request.number,
                        attempts: attempt,
                    })?;
                    return Ok(RunOutcome::Done {
                        number: item.number,
                        change_request: change_request.number,
                        attempts: attempt,
                    });
                }

                RunState::Blocked { reason } => {
                    self.ledger.append(RunEventKind::RunBlocked {
                        number: item.number,
                        reason: reason.to_string(),
                    })?;
                    return Ok(RunOutcome::Blocked {
                        number: item.number,
                        reason,
                    });
                }
            };
        }
    }

    /// Select the first candidate in the tracker's own result order and
    /// apply the advisory in-progress label.
    async fn claim(&self) -> Result<Option<WorkItem>> {
        let mut candidates = self.forge.find_candidates().await?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let item = candidates.remove(0);
        self.forge
            .add_labels(item.number, &[&self.config.in_progress_label])
            .await?;
        self.ledger.append(RunEventKind::ItemClaimed {
            number: item.number,
            url: item.html_url.clone(),
        })?;
        Ok(Some(item))
    }

    /// Fetch the fixed context bundle from the base branch. A path the
    /// branch does not have is skipped; context is best-effort, unlike the
    /// operations that mutate state.
    async fn load_context(&self) -> Result<BTreeMap<String, String>> {
        let mut context = BTreeMap::new();
        for path in &self.config.context_paths {
            match self.forge.get_file(path, &self.config.base_branch).await {
                Ok(content) => {
                    context.insert(path.clone(), content);
                }
                Err(AutodevError::RemoteService { status: 404, .. }) => {
                    tracing::warn!(event = "context.missing", path = %path);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_reason_display() {
        let reason = BlockReason::CiTimeout { polls: 30 };
        assert!(reason.to_string().contains("30 polls"));

        let reason = BlockReason::CiFailure { attempts: 2 };
        assert!(reason.to_string().contains("2 attempts"));

        let reason = BlockReason::Guardrail(GuardrailViolation::TooManyEdits {
            count: 5,
            limit: 3,
        });
        assert!(reason.to_string().contains("guardrail"));
    }
}
