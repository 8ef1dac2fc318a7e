//! Domain models for autodev.
//!
//! Canonical definitions for the core entities:
//! - `WorkItem`: a tracked unit of requested work (issue/ticket)
//! - `EditSet`: a bounded set of file replacements proposed by generation
//! - `ChangeRequest`: a reviewable, CI-gated merge proposal
//! - `CheckRun` / `CiState`: check-run status aggregation for one commit

pub mod change_request;
pub mod ci;
pub mod edit_set;
pub mod error;
pub mod work_item;

// Re-export main types and errors
pub use change_request::ChangeRequest;
pub use ci::{aggregate_checks, failure_summary, CheckConclusion, CheckRun, CheckRunStatus, CiState};
pub use edit_set::{EditSet, FileEdit};
pub use error::{AutodevError, Result};
pub use work_item::WorkItem;
