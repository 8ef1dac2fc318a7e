//! Work items sourced read-only from the tracking service.

use serde::{Deserialize, Serialize};

/// A tracked unit of requested work, snapshotted at claim time.
///
/// Never mutated locally; state transitions are expressed purely through
/// labels written back to the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Tracker-assigned identifier.
    pub number: u64,

    /// Issue title.
    pub title: String,

    /// Issue body text (empty when the tracker reports none).
    #[serde(default)]
    pub body: String,

    /// Labels at claim time.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Browser-facing URL, recorded in the event ledger on detection.
    #[serde(default)]
    pub html_url: String,
}

impl WorkItem {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// A work item is claimable iff it carries the trigger label and does
    /// not yet carry the in-progress label.
    pub fn is_eligible(&self, trigger: &str, in_progress: &str) -> bool {
        self.has_label(trigger) && !self.has_label(in_progress)
    }
}
