//! Drift between tracked repositories and directories present on disk.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::RepoName;

/// Set differences between the tracked and local repository sets.
///
/// Advisory only: commands surface it as a warning and carry on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Tracked but not present under the repos root.
    pub missing_locally: Vec<RepoName>,
    /// Present under the repos root but not tracked.
    pub untracked: Vec<RepoName>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_locally.is_empty() && self.untracked.is_empty()
    }
}

/// `missing_locally = tracked − local`, `untracked = local − tracked`.
///
/// Both sets are ordered, so each difference is a single linear merge.
pub fn compute_drift(tracked: &BTreeSet<RepoName>, local: &BTreeSet<RepoName>) -> DriftReport {
    DriftReport {
        missing_locally: tracked.difference(local).cloned().collect(),
        untracked: local.difference(tracked).cloned().collect(),
    }
}
