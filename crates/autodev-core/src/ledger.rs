//! Append-only JSONL event ledger with console mirroring.
//!
//! Every lifecycle step of a run lands here as one structured, timestamped
//! line; the same record is mirrored through `tracing` at info level. The
//! ledger is write-only; no component reads it back.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CiState, Result};

/// Classification of a run lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,

    /// The selection query matched nothing claimable.
    NoCandidates,

    ItemClaimed {
        number: u64,
        url: String,
    },

    GenerationFinished {
        number: u64,
        attempt: u32,
        summary: String,
        files: usize,
    },

    GuardrailRejected {
        number: u64,
        reason: String,
    },

    EditsApplied {
        number: u64,
        attempt: u32,
        paths: Vec<String>,
    },

    /// A change request was created (attempt 1) or located (attempt >= 2).
    ChangeRequestReady {
        number: u64,
        change_request: u64,
        url: String,
        head_sha: String,
        attempt: u32,
    },

    CiConcluded {
        number: u64,
        attempt: u32,
        state: CiState,
        polls_used: u32,
    },

    RetryScheduled {
        number: u64,
        next_attempt: u32,
        feedback: String,
    },

    RunSucceeded {
        number: u64,
        change_request: u64,
        attempts: u32,
    },

    RunBlocked {
        number: u64,
        reason: String,
    },

    /// A collaborator failed; the run aborted without label changes.
    CollaboratorFailure {
        message: String,
    },

    RunFinished,
}

/// One ledger record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub ts: DateTime<Utc>,

    /// Tags every record of one invocation.
    pub run_id: Uuid,

    #[serde(flatten)]
    pub kind: RunEventKind,
}

/// Durable, append-only event log.
pub struct EventLedger {
    path: PathBuf,
    run_id: Uuid,
}

impl EventLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and mirror it to the console stream.
    pub fn append(&self, kind: RunEventKind) -> Result<()> {
        let record = RunEvent {
            ts: Utc::now(),
            run_id: self.run_id,
            kind,
        };
        let line = serde_json::to_string(&record)?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        tracing::info!(event = "ledger.appended", record = %line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_writes_one_line_per_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = EventLedger::new(dir.path().join("events.jsonl"));

        ledger.append(RunEventKind::RunStarted).expect("append");
        ledger
            .append(RunEventKind::ItemClaimed {
                number: 42,
                url: "https://forge.local/issues/42".to_string(),
            })
            .expect("append");

        let raw = std::fs::read_to_string(ledger.path()).expect("read back");
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: RunEvent = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(first.kind, RunEventKind::RunStarted);
        assert_eq!(first.run_id, ledger.run_id());

        let second: RunEvent = serde_json::from_str(lines[1]).expect("parse");
        assert!(matches!(
            second.kind,
            RunEventKind::ItemClaimed { number: 42, .. }
        ));
    }

    #[test]
    fn test_append_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = EventLedger::new(dir.path().join("logs").join("events.jsonl"));
        ledger.append(RunEventKind::RunStarted).expect("append");
        assert!(ledger.path().exists());
    }

    #[test]
    fn test_event_kind_tag_is_snake_case() {
        let json = serde_json::to_string(&RunEventKind::NoCandidates).expect("serialize");
        assert!(json.contains(r#""event":"no_candidates""#));
    }
}
