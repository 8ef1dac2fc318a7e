//! Change requests on the hosting service.

use serde::{Deserialize, Serialize};

/// A reviewable, CI-gated proposal to merge a branch into the base branch.
///
/// Associated 1:1 with a deterministically named branch. Created on the
/// first attempt of a run; located (never recreated) on later attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Hosting-service identifier.
    pub number: u64,

    /// Browser-facing URL.
    pub url: String,

    /// Head commit the CI poll loop is keyed on.
    pub head_sha: String,
}
