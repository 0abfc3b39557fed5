//! Batch command executor.
//!
//! Runs one [`RepoAction`] per repository on a bounded pool of blocking
//! workers. Repositories are independent: a failure is recorded in that
//! repository's report and the batch carries on. Reports come back in input
//! order regardless of completion order.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use gitbackup_core::{RemoteTarget, RepoName};

use crate::outcome::{Outcome, RepoReport, CANCELLED};
use crate::tools::Vcs;

pub const NOT_PRESENT: &str = "not present locally";
pub const NOT_A_REPOSITORY: &str = "not a git repository";

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared by the executor and its workers.
///
/// Once cancelled, queued repositories are skipped and in-flight ones stop
/// before their next external call.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Jobs and actions
// ---------------------------------------------------------------------------

/// One repository handed to an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoJob {
    pub repo: RepoName,
    /// Working tree under the repositories root.
    pub dir: PathBuf,
    /// Remote targets recorded for the repository in the tracking store.
    pub remotes: Vec<RemoteTarget>,
}

/// Per-repository work run on a blocking worker.
pub trait RepoAction: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// When true (the default) the executor skips repositories whose
    /// directory is missing or is not a git work tree.
    fn requires_work_tree(&self) -> bool {
        true
    }

    fn run(&self, job: &RepoJob, cancel: &CancelToken) -> RepoReport;
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    vcs: Arc<dyn Vcs>,
    workers: usize,
    cancel: CancelToken,
}

impl Executor {
    pub fn new(vcs: Arc<dyn Vcs>, workers: usize, cancel: CancelToken) -> Self {
        Self {
            vcs,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Run `action` over `jobs`, returning one report per job in input order.
    pub async fn run(&self, jobs: Vec<RepoJob>, action: Arc<dyn RepoAction>) -> Vec<RepoReport> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let names: Vec<RepoName> = jobs.iter().map(|j| j.repo.clone()).collect();
        let mut slots: Vec<Option<RepoReport>> = (0..jobs.len()).map(|_| None).collect();
        let mut set = JoinSet::new();

        tracing::debug!(
            jobs = jobs.len(),
            workers = self.workers,
            "starting {}",
            action.name()
        );

        for (index, job) in jobs.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots[index] = Some(RepoReport::skipped(job.repo, CANCELLED));
                continue;
            };

            let vcs = Arc::clone(&self.vcs);
            let action = Arc::clone(&action);
            let cancel = self.cancel.clone();
            set.spawn_blocking(move || {
                let _permit = permit;
                (index, run_one(&*vcs, &*action, &job, &cancel))
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => tracing::error!("worker task failed: {e}"),
            }
        }

        slots
            .into_iter()
            .zip(names)
            .map(|(slot, repo)| {
                slot.unwrap_or_else(|| RepoReport {
                    repo,
                    outcome: Outcome::Failure {
                        status: None,
                        output: "worker task panicked".to_owned(),
                    },
                    units: Vec::new(),
                })
            })
            .collect()
    }
}

fn run_one(vcs: &dyn Vcs, action: &dyn RepoAction, job: &RepoJob, cancel: &CancelToken) -> RepoReport {
    if cancel.is_cancelled() {
        return RepoReport::skipped(job.repo.clone(), CANCELLED);
    }
    if action.requires_work_tree() {
        if !job.dir.is_dir() {
            tracing::warn!("skipping {}: {} does not exist", job.repo, job.dir.display());
            return RepoReport::skipped(job.repo.clone(), NOT_PRESENT);
        }
        if !vcs.is_work_tree(&job.dir) {
            tracing::warn!("skipping {}: {} is not a git repository", job.repo, job.dir.display());
            return RepoReport::skipped(job.repo.clone(), NOT_A_REPOSITORY);
        }
    }
    let report = action.run(job, cancel);
    tracing::info!(repo = %job.repo, outcome = report.outcome.label(), "{}", action.name());
    report
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::outcome::{Unit, UnitReport};
    use crate::tools::fake::FakeTools;

    /// Earlier repositories sleep longer so completion order is reversed.
    struct Sleepy {
        fail: &'static str,
        panic: &'static str,
    }

    impl RepoAction for Sleepy {
        fn name(&self) -> &'static str {
            "sleepy"
        }

        fn run(&self, job: &RepoJob, _cancel: &CancelToken) -> RepoReport {
            let delay = match job.repo.as_str() {
                "a" => 60,
                "b" => 40,
                "c" => 20,
                _ => 0,
            };
            std::thread::sleep(Duration::from_millis(delay));
            if job.repo.as_str() == self.panic {
                panic!("boom");
            }
            let outcome = if job.repo.as_str() == self.fail {
                Outcome::Failure {
                    status: Some(1),
                    output: "nope".into(),
                }
            } else {
                Outcome::success("")
            };
            RepoReport::from_units(job.repo.clone(), vec![UnitReport::new(Unit::Fetch, outcome)])
        }
    }

    fn jobs(fake: &FakeTools, root: &std::path::Path, names: &[&str]) -> Vec<RepoJob> {
        names
            .iter()
            .map(|n| {
                let dir = root.join(n);
                fake.add_repo(&dir, &["main"], &[]);
                RepoJob {
                    repo: RepoName::from(*n),
                    dir,
                    remotes: Vec::new(),
                }
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reports_follow_input_order() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeTools::new();
        let jobs = jobs(&fake, tmp.path(), &["a", "b", "c", "d", "e"]);
        let executor = Executor::new(fake.vcs(), 3, CancelToken::new());

        let reports = executor
            .run(jobs, Arc::new(Sleepy { fail: "", panic: "" }))
            .await;
        let names: Vec<&str> = reports.iter().map(|r| r.repo.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert!(reports.iter().all(|r| r.outcome.is_success()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn one_failure_does_not_affect_others() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeTools::new();
        let jobs = jobs(&fake, tmp.path(), &["a", "b", "c"]);
        let executor = Executor::new(fake.vcs(), 2, CancelToken::new());

        let reports = executor
            .run(jobs, Arc::new(Sleepy { fail: "b", panic: "c" }))
            .await;
        assert!(reports[0].outcome.is_success());
        assert!(reports[1].outcome.is_failure());
        assert!(reports[2].outcome.is_failure(), "a panic becomes a failure");
        assert_eq!(reports[2].repo.as_str(), "c");
    }

    #[tokio::test]
    async fn missing_and_non_repo_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeTools::new();
        let mut jobs = jobs(&fake, tmp.path(), &["ok"]);
        std::fs::create_dir(tmp.path().join("plain")).unwrap();
        for name in ["gone", "plain"] {
            jobs.push(RepoJob {
                repo: RepoName::from(name),
                dir: tmp.path().join(name),
                remotes: Vec::new(),
            });
        }
        let executor = Executor::new(fake.vcs(), 4, CancelToken::new());

        let reports = executor
            .run(jobs, Arc::new(Sleepy { fail: "", panic: "" }))
            .await;
        assert!(reports[0].outcome.is_success());
        assert_eq!(reports[1].outcome, Outcome::skipped(NOT_PRESENT));
        assert_eq!(reports[2].outcome, Outcome::skipped(NOT_A_REPOSITORY));
    }

    #[tokio::test]
    async fn cancelled_batch_skips_everything() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeTools::new();
        let jobs = jobs(&fake, tmp.path(), &["a", "b"]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let executor = Executor::new(fake.vcs(), 1, cancel);

        let reports = executor
            .run(jobs, Arc::new(Sleepy { fail: "", panic: "" }))
            .await;
        assert!(reports.iter().all(|r| r.outcome.is_cancelled()));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter woke")
            .expect("join");
        assert!(token.is_cancelled());
    }
}
