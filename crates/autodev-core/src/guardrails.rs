//! Pre-application safety checks for proposed edit sets.
//!
//! The generation boundary is untrusted: it may propose oversized edit sets
//! or paths that escape the repository. Validation runs on every attempt,
//! before anything is persisted; a rejection terminates the whole run as
//! blocked and is never retried.

use serde::{Deserialize, Serialize};

use crate::domain::EditSet;

/// Maximum number of files one edit set may touch.
pub const MAX_EDITS: usize = 3;

/// A guardrail rule violation. The display form names the offending value
/// and is posted verbatim to the work item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardrailViolation {
    #[error("edit set touches {count} files, limit is {limit}")]
    TooManyEdits { count: usize, limit: usize },

    #[error("unsafe path in edit set: {path}")]
    InvalidPath { path: String },
}

/// Validate an edit set against the safety rules.
///
/// Rules are checked in order and the first violation wins:
/// 1. edit count above [`MAX_EDITS`]
/// 2. any absolute path
/// 3. any path containing a parent-directory traversal segment
pub fn validate_edit_set(set: &EditSet) -> Result<(), GuardrailViolation> {
    if set.len() > MAX_EDITS {
        return Err(GuardrailViolation::TooManyEdits {
            count: set.len(),
            limit: MAX_EDITS,
        });
    }
    if let Some(path) = set.paths().find(|p| is_absolute(p)) {
        return Err(GuardrailViolation::InvalidPath {
            path: path.to_string(),
        });
    }
    if let Some(path) = set.paths().find(|p| has_traversal(p)) {
        return Err(GuardrailViolation::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(())
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.starts_with('\\') || std::path::Path::new(path).is_absolute()
}

fn has_traversal(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileEdit;

    fn set_of(paths: &[&str]) -> EditSet {
        EditSet {
            summary: "s".to_string(),
            edits: paths
                .iter()
                .map(|p| FileEdit {
                    path: p.to_string(),
                    content: "x".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_relative_paths_within_limit_pass() {
        let set = set_of(&["src/lib.rs", "tests/api.rs", "Cargo.toml"]);
        assert!(validate_edit_set(&set).is_ok());
    }

    #[test]
    fn test_count_limit_wins_over_path_validity() {
        // Four edits, one of them absolute: the count rule fires first.
        let set = set_of(&["a", "b", "c", "/etc/passwd"]);
        assert_eq!(
            validate_edit_set(&set),
            Err(GuardrailViolation::TooManyEdits { count: 4, limit: 3 })
        );
    }

    #[test]
    fn test_absolute_path_rejected() {
        let set = set_of(&["src/lib.rs", "/etc/passwd"]);
        assert_eq!(
            validate_edit_set(&set),
            Err(GuardrailViolation::InvalidPath {
                path: "/etc/passwd".to_string()
            })
        );
    }

    #[test]
    fn test_backslash_rooted_path_rejected() {
        let set = set_of(&["\\windows\\system32"]);
        assert!(matches!(
            validate_edit_set(&set),
            Err(GuardrailViolation::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_traversal_segment_rejected() {
        let set = set_of(&["src/../../secrets.txt"]);
        assert_eq!(
            validate_edit_set(&set),
            Err(GuardrailViolation::InvalidPath {
                path: "src/../../secrets.txt".to_string()
            })
        );
    }

    #[test]
    fn test_dotdot_as_name_fragment_is_allowed() {
        // "..rc" is a legal file name; only a whole ".." segment traverses.
        let set = set_of(&["conf/..rc", "notes/a..b.md"]);
        assert!(validate_edit_set(&set).is_ok());
    }

    #[test]
    fn test_absolute_rule_checked_before_traversal() {
        let set = set_of(&["ok/../nope", "/root"]);
        assert_eq!(
            validate_edit_set(&set),
            Err(GuardrailViolation::InvalidPath {
                path: "/root".to_string()
            })
        );
    }

    #[test]
    fn test_empty_set_passes() {
        assert!(validate_edit_set(&set_of(&[])).is_ok());
    }

    #[test]
    fn test_violation_display_names_offending_value() {
        let err = GuardrailViolation::TooManyEdits { count: 5, limit: 3 };
        assert!(err.to_string().contains('5'));

        let err = GuardrailViolation::InvalidPath {
            path: "../up".to_string(),
        };
        assert!(err.to_string().contains("../up"));
    }
}
