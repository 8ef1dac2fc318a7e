//! Edit sets proposed by the change-generation service.

use serde::{Deserialize, Serialize};

/// One full-content file replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Repo-relative path of the file to create or replace.
    pub path: String,

    /// Complete new file content (not a diff).
    pub content: String,
}

/// An ordered, bounded set of file replacements plus a free-text summary.
///
/// Created once per attempt, consumed immediately by the delivery layer,
/// never retained. Guardrail validation is mandatory before application;
/// the producing boundary is adversarial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSet {
    pub summary: String,
    pub edits: Vec<FileEdit>,
}

impl EditSet {
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.edits.iter().map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_set_serde_roundtrip() {
        let set = EditSet {
            summary: "validate inputs".to_string(),
            edits: vec![FileEdit {
                path: "app/main.py".to_string(),
                content: "def add(a, b): ...\n".to_string(),
            }],
        };
        let json = serde_json::to_string(&set).expect("serialize");
        let back: EditSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(set, back);
    }

    #[test]
    fn test_paths_preserve_order() {
        let set = EditSet {
            summary: String::new(),
            edits: vec![
                FileEdit {
                    path: "b.rs".to_string(),
                    content: String::new(),
                },
                FileEdit {
                    path: "a.rs".to_string(),
                    content: String::new(),
                },
            ],
        };
        let paths: Vec<_> = set.paths().collect();
        assert_eq!(paths, vec!["b.rs", "a.rs"]);
    }
}
