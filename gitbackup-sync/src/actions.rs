//! Per-repository actions run by the [`Executor`](crate::executor::Executor).
//!
//! Each action performs its external calls strictly in order and records
//! one unit per call. A failed unit never stops the independent units after
//! it; cancellation turns every unit not yet started into a skipped one.

use gitbackup_core::{resolve, RemoteTarget, RepoName, ResolveOptions, Visibility};

use crate::error::SyncError;
use crate::executor::{CancelToken, RepoAction, RepoJob};
use crate::outcome::{Outcome, RepoReport, Unit, UnitReport};
use crate::reconcile::{self, ReconcileReport};
use crate::tools::Toolkit;

/// Run `call` unless the batch is cancelled.
fn step(cancel: &CancelToken, unit: Unit, call: impl FnOnce() -> Outcome) -> UnitReport {
    if cancel.is_cancelled() {
        return UnitReport::new(unit, Outcome::cancelled());
    }
    UnitReport::new(unit, call())
}

fn error_outcome(err: &SyncError) -> Outcome {
    match err {
        SyncError::Tool(e) => Outcome::failure(e),
        other => Outcome::Failure {
            status: None,
            output: other.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Read-mostly batch actions
// ---------------------------------------------------------------------------

/// `git fetch --all`.
pub struct Fetch {
    pub tools: Toolkit,
}

impl RepoAction for Fetch {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let unit = step(cancel, Unit::Fetch, || {
            Outcome::from_tool(&self.tools.vcs.fetch_all(&job.dir))
        });
        RepoReport::from_units(job.repo.clone(), vec![unit])
    }
}

/// `git status`, output captured.
pub struct Status {
    pub tools: Toolkit,
}

impl RepoAction for Status {
    fn name(&self) -> &'static str {
        "status"
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let unit = step(cancel, Unit::Status, || {
            Outcome::from_tool(&self.tools.vcs.status(&job.dir))
        });
        RepoReport::from_units(job.repo.clone(), vec![unit])
    }
}

/// `bash -c <command>` in each working tree.
pub struct Foreach {
    pub tools: Toolkit,
    pub command: String,
}

impl RepoAction for Foreach {
    fn name(&self) -> &'static str {
        "foreach"
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let unit = Unit::Foreach {
            command: self.command.clone(),
        };
        let unit = step(cancel, unit, || {
            Outcome::from_tool(&self.tools.shell.run(&job.dir, &self.command))
        });
        RepoReport::from_units(job.repo.clone(), vec![unit])
    }
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

/// Push every local branch to every remote of the repository.
///
/// Remotes are the aliases of the tracked targets, or the working tree's
/// own remote list when the tracking entry records none. Pairs are pushed
/// branch by branch, remote by remote; a failed pair does not stop the rest.
pub struct Push {
    pub tools: Toolkit,
}

impl RepoAction for Push {
    fn name(&self) -> &'static str {
        "push"
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let vcs = &self.tools.vcs;
        let repo = job.repo.clone();

        let branches = match vcs.list_branches(&job.dir) {
            Ok(branches) => branches,
            Err(e) => {
                let unit = UnitReport::new(Unit::ListBranches, Outcome::failure(&e));
                return RepoReport::from_units(repo, vec![unit]);
            }
        };

        let remotes: Vec<String> = if job.remotes.is_empty() {
            match vcs.list_remotes(&job.dir) {
                Ok(remotes) => remotes.into_iter().map(|r| r.alias).collect(),
                Err(e) => {
                    let unit = UnitReport::new(Unit::ListRemotes, Outcome::failure(&e));
                    return RepoReport::from_units(repo, vec![unit]);
                }
            }
        } else {
            job.remotes.iter().map(|t| t.alias().to_owned()).collect()
        };

        if branches.is_empty() {
            return RepoReport::skipped(repo, "no local branches");
        }
        if remotes.is_empty() {
            return RepoReport::skipped(repo, "no remotes configured");
        }

        let mut units = Vec::with_capacity(branches.len() * remotes.len());
        for branch in &branches {
            for remote in &remotes {
                let unit = Unit::Push {
                    branch: branch.clone(),
                    remote: remote.clone(),
                };
                units.push(step(cancel, unit, || {
                    Outcome::from_tool(&vcs.push(&job.dir, remote, branch))
                }));
            }
        }
        RepoReport::from_units(repo, units)
    }
}

// ---------------------------------------------------------------------------
// Remote reconciliation
// ---------------------------------------------------------------------------

fn reconcile_report(repo: RepoName, result: Result<ReconcileReport, SyncError>) -> RepoReport {
    match reconcile::report_of(result) {
        Ok(reconciled) => {
            let mut report = RepoReport::from_units(repo, reconciled.units());
            if report.outcome.is_success() {
                report.outcome = Outcome::success(reconciled.summary());
            }
            report
        }
        Err(SyncError::RemoveRemote {
            alias,
            removed,
            source,
        }) => {
            let mut units: Vec<UnitReport> = removed
                .into_iter()
                .map(|alias| UnitReport::new(Unit::RemoveRemote { alias }, Outcome::success("")))
                .collect();
            units.push(UnitReport::new(
                Unit::RemoveRemote { alias },
                Outcome::failure(&source),
            ));
            RepoReport::from_units(repo, units)
        }
        Err(e) => RepoReport::from_units(
            repo,
            vec![UnitReport::new(Unit::ListRemotes, error_outcome(&e))],
        ),
    }
}

/// Remove every remote, then add the resolved targets.
pub struct ResetRemotes {
    pub tools: Toolkit,
    pub options: ResolveOptions,
}

impl RepoAction for ResetRemotes {
    fn name(&self) -> &'static str {
        "reset-remotes"
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let resolved = resolve(&job.repo, &self.options);
        let result = reconcile::reset(&*self.tools.vcs, &job.dir, &job.repo, &resolved, cancel);
        reconcile_report(job.repo.clone(), result)
    }
}

/// Add the resolved targets that are missing; never remove.
pub struct AddRemotes {
    pub tools: Toolkit,
    pub options: ResolveOptions,
}

impl RepoAction for AddRemotes {
    fn name(&self) -> &'static str {
        "add-remotes"
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let vcs = &*self.tools.vcs;
        let resolved = resolve(&job.repo, &self.options);
        let result = reconcile::current_remotes(vcs, &job.dir).and_then(|current| {
            reconcile::add_missing(vcs, &job.dir, &job.repo, &current, &resolved, cancel)
        });
        reconcile_report(job.repo.clone(), result)
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Create the repository on every resolved target, wire up the missing
/// remotes, then push everything to the targets created in this run.
///
/// Order: hosted service first, then each SSH host. Targets that already
/// exist are skipped, not recreated.
pub struct Create {
    pub tools: Toolkit,
    pub options: ResolveOptions,
    pub visibility: Visibility,
}

impl Create {
    /// Create one target; the flag is true if it was created in this run.
    fn create_target(
        &self,
        job: &RepoJob,
        target: &RemoteTarget,
        cancel: &CancelToken,
    ) -> (UnitReport, bool) {
        let report = match target {
            RemoteTarget::Hosted { owner } => {
                let unit = Unit::CreateHosted {
                    owner: owner.clone(),
                };
                step(cancel, unit, || self.create_hosted(job, owner))
            }
            RemoteTarget::Ssh { host, remote_path } => {
                let unit = Unit::CreateSsh { host: host.clone() };
                step(cancel, unit, || self.create_ssh(job, target, host, remote_path))
            }
        };
        let created = report.outcome.is_success();
        (report, created)
    }

    fn create_hosted(&self, job: &RepoJob, owner: &str) -> Outcome {
        let hosting = &self.tools.hosting;
        match hosting.exists(owner, &job.repo) {
            Ok(true) => Outcome::skipped("already exists"),
            Ok(false) => Outcome::from_tool(&hosting.create(
                owner,
                &job.repo,
                self.visibility,
                &job.dir,
            )),
            Err(e) => Outcome::failure(&e),
        }
    }

    fn create_ssh(&self, job: &RepoJob, target: &RemoteTarget, host: &str, remote_path: &str) -> Outcome {
        if self.tools.vcs.probe(&job.dir, &target.url(&job.repo)).is_ok() {
            return Outcome::skipped("already exists");
        }
        Outcome::from_tool(&self.tools.ssh.create_bare(host, remote_path))
    }
}

impl RepoAction for Create {
    fn name(&self) -> &'static str {
        "create"
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let vcs = &*self.tools.vcs;
        let resolved = resolve(&job.repo, &self.options);
        let (hosted, ssh): (Vec<&RemoteTarget>, Vec<&RemoteTarget>) = resolved
            .iter()
            .partition(|t| matches!(t, RemoteTarget::Hosted { .. }));

        let mut units = Vec::new();
        let mut created = Vec::new();
        for target in hosted.into_iter().chain(ssh) {
            let (unit, was_created) = self.create_target(job, target, cancel);
            units.push(unit);
            if was_created {
                created.push(target.clone());
            }
        }

        let configured: Vec<RemoteTarget> = match reconcile::current_remotes(vcs, &job.dir) {
            Ok(current) => {
                let result =
                    reconcile::add_missing(vcs, &job.dir, &job.repo, &current, &resolved, cancel);
                match reconcile::report_of(result) {
                    Ok(reconciled) => {
                        units.extend(reconciled.units());
                        reconciled
                            .added
                            .into_iter()
                            .chain(reconciled.unchanged)
                            .collect()
                    }
                    Err(e) => {
                        units.push(UnitReport::new(Unit::ListRemotes, error_outcome(&e)));
                        Vec::new()
                    }
                }
            }
            Err(e) => {
                units.push(UnitReport::new(Unit::ListRemotes, error_outcome(&e)));
                Vec::new()
            }
        };

        for target in created.iter().filter(|t| configured.contains(t)) {
            let remote = target.alias().to_owned();
            let unit = Unit::InitialPush {
                remote: remote.clone(),
            };
            units.push(step(cancel, unit, || {
                Outcome::from_tool(&vcs.push_all(&job.dir, &remote))
            }));
        }

        RepoReport::from_units(job.repo.clone(), units)
    }
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

/// Where a clone comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneSource {
    /// Any URL git understands.
    Url(String),
    /// `owner/name` (or `name`) on the hosted service.
    Hosted(String),
}

impl CloneSource {
    fn describe(&self) -> String {
        match self {
            CloneSource::Url(url) => url.clone(),
            CloneSource::Hosted(slug) => format!("hosted:{slug}"),
        }
    }
}

/// Clone into the repositories root, then reset its remotes.
pub struct CloneRepo {
    pub tools: Toolkit,
    pub source: CloneSource,
    pub options: ResolveOptions,
}

impl RepoAction for CloneRepo {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn requires_work_tree(&self) -> bool {
        false
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
        let parent = job.dir.parent().unwrap_or(&job.dir);
        let dest = job.repo.as_str();
        let unit = Unit::Clone {
            source: self.source.describe(),
        };
        let cloned = step(cancel, unit, || {
            Outcome::from_tool(&match &self.source {
                CloneSource::Url(url) => self.tools.vcs.clone_repo(parent, url, dest),
                CloneSource::Hosted(slug) => self.tools.hosting.clone_repo(parent, slug, dest),
            })
        });
        if !cloned.outcome.is_success() {
            return RepoReport::from_units(job.repo.clone(), vec![cloned]);
        }

        let resolved = resolve(&job.repo, &self.options);
        let result = reconcile::reset(&*self.tools.vcs, &job.dir, &job.repo, &resolved, cancel);
        let reset = reconcile_report(job.repo.clone(), result);

        let mut units = vec![cloned];
        units.extend(reset.units);
        let mut report = RepoReport::from_units(job.repo.clone(), units);
        if report.outcome.is_success() {
            report.outcome = Outcome::success(format!("cloned; {}", reset.outcome.text()));
        }
        report
    }
}
