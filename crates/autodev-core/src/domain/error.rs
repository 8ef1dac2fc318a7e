//! Domain-level error taxonomy for autodev.

use crate::guardrails::GuardrailViolation;

/// autodev domain errors.
///
/// Collaborator-layer failures are never retried automatically; only a CI
/// `failure` conclusion drives the bounded generation retry, and that policy
/// lives in the orchestrator, not here.
#[derive(Debug, thiserror::Error)]
pub enum AutodevError {
    /// Non-success response from the tracking/hosting/CI surface.
    #[error("remote service returned {status}: {message}")]
    RemoteService { status: u16, message: String },

    /// Connection-level or protocol-level failure before a status was read.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The generation service returned something that is not a valid edit set.
    #[error("malformed generation output: {0}")]
    MalformedGeneration(String),

    /// The proposed edit set violated a pre-application safety rule.
    ///
    /// The orchestrator handles violations as a blocked disposition rather
    /// than an abort; this variant exists so callers composing
    /// `validate_edit_set` with `?` get a uniform error type.
    #[error("guardrail rejected edit set: {0}")]
    Guardrail(#[from] GuardrailViolation),

    /// A retry attempt could not locate its open change request.
    #[error("no open change request found for branch {branch}")]
    MissingChangeRequest { branch: String },

    /// The run was aborted through the cancellation token.
    #[error("run cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for autodev domain operations.
pub type Result<T> = std::result::Result<T, AutodevError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_service_error_display() {
        let err = AutodevError::RemoteService {
            status: 422,
            message: "Validation Failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("Validation Failed"));
    }

    #[test]
    fn test_missing_change_request_display() {
        let err = AutodevError::MissingChangeRequest {
            branch: "ai/issue-42".to_string(),
        };
        assert!(err.to_string().contains("ai/issue-42"));
    }

    #[test]
    fn test_guardrail_error_wraps_violation() {
        let err: AutodevError = GuardrailViolation::InvalidPath {
            path: "/etc/passwd".to_string(),
        }
        .into();
        assert!(err.to_string().contains("/etc/passwd"));
    }
}
