//! Remote reconciliation: make a working tree's remotes match a resolved list.
//!
//! Two modes:
//!
//! - [`reset`] removes every configured remote, then adds the resolved list
//!   in order. A failed removal aborts before anything is added; a failed
//!   addition does not stop the remaining ones. Removals are never rolled
//!   back.
//! - [`add_missing`] adds the resolved targets not already present by
//!   structural identity and never removes anything. Running it twice is a
//!   no-op the second time.

use std::path::Path;

use serde::Serialize;

use gitbackup_core::{RemoteTarget, RepoName};

use crate::error::SyncError;
use crate::executor::CancelToken;
use crate::outcome::{Outcome, Unit, UnitReport};
use crate::tools::{ConfiguredRemote, ToolError, Vcs};

/// A resolved target that could not be added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTarget {
    pub target: RemoteTarget,
    pub status: Option<i32>,
    pub output: String,
}

/// What a reconciliation did to one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub repo: RepoName,
    /// Aliases removed, in removal order.
    pub removed: Vec<String>,
    pub added: Vec<RemoteTarget>,
    /// Resolved targets already present.
    pub unchanged: Vec<RemoteTarget>,
    pub failed: Vec<FailedTarget>,
    /// Targets not attempted because the batch was cancelled.
    pub skipped: Vec<RemoteTarget>,
}

impl ReconcileReport {
    pub fn new(repo: RepoName) -> Self {
        Self {
            repo,
            removed: Vec::new(),
            added: Vec::new(),
            unchanged: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// True when every resolved target is now configured.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// One line naming what was added and what failed.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.removed.is_empty() {
            parts.push(format!("removed {}", self.removed.join(", ")));
        }
        if !self.added.is_empty() {
            parts.push(format!("added {}", aliases(self.added.iter())));
        }
        if !self.failed.is_empty() {
            parts.push(format!(
                "failed {}",
                aliases(self.failed.iter().map(|f| &f.target))
            ));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("cancelled {}", aliases(self.skipped.iter())));
        }
        if parts.is_empty() {
            return "remotes already up to date".to_owned();
        }
        parts.join("; ")
    }

    /// Per-remote units for a repository report.
    pub fn units(&self) -> Vec<UnitReport> {
        let add = |target: &RemoteTarget| Unit::AddRemote {
            alias: target.alias().to_owned(),
            url: target.url(&self.repo),
        };
        let mut units: Vec<UnitReport> = self
            .removed
            .iter()
            .map(|alias| {
                UnitReport::new(
                    Unit::RemoveRemote {
                        alias: alias.clone(),
                    },
                    Outcome::success(""),
                )
            })
            .collect();
        units.extend(
            self.unchanged
                .iter()
                .map(|t| UnitReport::new(add(t), Outcome::skipped("already configured"))),
        );
        units.extend(
            self.added
                .iter()
                .map(|t| UnitReport::new(add(t), Outcome::success(""))),
        );
        units.extend(self.failed.iter().map(|f| {
            UnitReport::new(
                add(&f.target),
                Outcome::Failure {
                    status: f.status,
                    output: f.output.clone(),
                },
            )
        }));
        units.extend(
            self.skipped
                .iter()
                .map(|t| UnitReport::new(add(t), Outcome::cancelled())),
        );
        units
    }

    /// `Err(PartialReconcile)` if any target failed.
    fn into_result(self) -> Result<ReconcileReport, SyncError> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(SyncError::PartialReconcile(Box::new(self)))
        }
    }

    fn add(
        &mut self,
        vcs: &dyn Vcs,
        dir: &Path,
        target: &RemoteTarget,
        cancel: &CancelToken,
    ) {
        if cancel.is_cancelled() {
            self.skipped.push(target.clone());
            return;
        }
        match vcs.add_remote(dir, target.alias(), &target.url(&self.repo)) {
            Ok(_) => {
                tracing::debug!("{}: added remote {}", self.repo, target.alias());
                self.added.push(target.clone());
            }
            Err(ToolError { status, output, .. }) => {
                tracing::warn!("{}: could not add remote {}", self.repo, target.alias());
                self.failed.push(FailedTarget {
                    target: target.clone(),
                    status,
                    output,
                });
            }
        }
    }
}

fn aliases<'a>(targets: impl Iterator<Item = &'a RemoteTarget>) -> String {
    targets.map(RemoteTarget::alias).collect::<Vec<_>>().join(", ")
}

/// Remotes currently configured in `dir`.
pub fn current_remotes(vcs: &dyn Vcs, dir: &Path) -> Result<Vec<ConfiguredRemote>, SyncError> {
    Ok(vcs.list_remotes(dir)?)
}

/// Replace every remote of `dir` with `resolved`, in order.
pub fn reset(
    vcs: &dyn Vcs,
    dir: &Path,
    repo: &RepoName,
    resolved: &[RemoteTarget],
    cancel: &CancelToken,
) -> Result<ReconcileReport, SyncError> {
    let current = current_remotes(vcs, dir)?;
    let mut report = ReconcileReport::new(repo.clone());

    for remote in &current {
        if cancel.is_cancelled() {
            report.skipped = resolved.to_vec();
            return Ok(report);
        }
        if let Err(source) = vcs.remove_remote(dir, &remote.alias) {
            return Err(SyncError::RemoveRemote {
                alias: remote.alias.clone(),
                removed: report.removed,
                source,
            });
        }
        report.removed.push(remote.alias.clone());
    }

    for target in resolved {
        report.add(vcs, dir, target, cancel);
    }
    report.into_result()
}

/// Add the targets in `resolved` that `current` does not already hold.
///
/// A target whose alias is taken by a remote with a different identity is
/// recorded as failed rather than overwritten.
pub fn add_missing(
    vcs: &dyn Vcs,
    dir: &Path,
    repo: &RepoName,
    current: &[ConfiguredRemote],
    resolved: &[RemoteTarget],
    cancel: &CancelToken,
) -> Result<ReconcileReport, SyncError> {
    let present: Vec<Option<RemoteTarget>> = current.iter().map(|r| r.target(repo)).collect();
    let mut report = ReconcileReport::new(repo.clone());

    for target in resolved {
        if present.iter().flatten().any(|p| p == target) {
            report.unchanged.push(target.clone());
            continue;
        }
        if let Some(taken) = current.iter().find(|r| r.alias == target.alias()) {
            report.failed.push(FailedTarget {
                target: target.clone(),
                status: None,
                output: format!(
                    "alias '{}' already points at {}",
                    taken.alias, taken.url
                ),
            });
            continue;
        }
        report.add(vcs, dir, target, cancel);
    }
    report.into_result()
}

/// Targets `current` holds under their default alias, the form `push` and
/// the tracking store address them by.
///
/// Resolved targets come first in resolved order, then the rest in listing
/// order. Remotes under any other alias, or with an unrecognised URL, are
/// left out.
pub fn managed_targets(
    repo: &RepoName,
    current: &[ConfiguredRemote],
    resolved: &[RemoteTarget],
) -> Vec<RemoteTarget> {
    let managed: Vec<RemoteTarget> = current
        .iter()
        .filter_map(|r| r.target(repo).filter(|t| t.alias() == r.alias))
        .collect();
    let mut ordered: Vec<RemoteTarget> = resolved
        .iter()
        .filter(|t| managed.contains(t))
        .cloned()
        .collect();
    ordered.extend(managed.into_iter().filter(|t| !resolved.contains(t)));
    ordered
}

/// Split a reconciliation result into its report, or the error that stopped it.
pub(crate) fn report_of(
    result: Result<ReconcileReport, SyncError>,
) -> Result<ReconcileReport, SyncError> {
    match result {
        Err(SyncError::PartialReconcile(report)) => Ok(*report),
        other => other,
    }
}
