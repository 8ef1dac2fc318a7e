//! autodev core library
//!
//! Domain types and the orchestration state machine that turn a tracked
//! work item into a reviewed, CI-verified change request. External
//! collaborators (tracking/hosting forge, generation service) sit behind
//! the `ForgeApi` and `CompletionBackend` traits; HTTP implementations
//! live in the `autodev-forge` crate.

pub mod config;
pub mod delivery;
pub mod domain;
pub mod fakes;
pub mod forge;
pub mod generate;
pub mod guardrails;
pub mod ledger;
pub mod orchestrator;
pub mod poll;
pub mod telemetry;

pub use config::{OrchestratorConfig, PollConfig};
pub use delivery::{change_request_body, change_request_title, ChangeDelivery};
pub use domain::{
    aggregate_checks, failure_summary, AutodevError, ChangeRequest, CheckConclusion, CheckRun,
    CheckRunStatus, CiState, EditSet, FileEdit, Result, WorkItem,
};
pub use forge::ForgeApi;
pub use generate::{build_prompt, parse_edit_set, ChangeGenerator, CompletionBackend};
pub use guardrails::{validate_edit_set, GuardrailViolation, MAX_EDITS};
pub use ledger::{EventLedger, RunEvent, RunEventKind};
pub use orchestrator::{BlockReason, Orchestrator, RunOutcome};
pub use poll::{await_terminal, CiPollOutcome};
pub use telemetry::init_tracing;

/// autodev version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
