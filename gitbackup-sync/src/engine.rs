//! Command engine: one entrypoint per `git-backup` command.
//!
//! Every command loads the tracking store fresh, so configuration errors
//! surface before any external call. Batch commands compute drift as a
//! pre-flight warning, hand one job per tracked repository to the
//! [`Executor`], and return a [`BatchReport`]. Mutating commands then save
//! the store (single writer, after all workers have joined) and commit the
//! tracking directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use gitbackup_core::config::{load_config_at, TRACKING_DIR_NAME};
use gitbackup_core::{
    compute_drift, resolve, scan, store, BackupConfig, CoreError, DriftReport, Layout,
    RemoteTarget, RepoName, ResolveOptions, TrackedRepository, TrackingStore,
};

use crate::actions::{self, CloneSource};
use crate::error::SyncError;
use crate::executor::{CancelToken, Executor, RepoAction, RepoJob};
use crate::outcome::{BatchReport, Outcome, RepoReport, Unit, UnitReport};
use crate::reconcile;
use crate::tools::Toolkit;

/// Per-invocation choice about the hosted remote (`--gh`, `--no-gh`, `--owner`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostedChoice {
    /// Overrides `gh` from the config when set.
    pub enabled: Option<bool>,
    /// Overrides `gh_owner` from the config when set.
    pub owner: Option<String>,
}

/// Output of `list`: tracked repositories and drift, no external calls.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub repos: Vec<TrackedRepository>,
    pub drift: DriftReport,
}

pub struct Engine {
    layout: Layout,
    config: BackupConfig,
    tools: Toolkit,
    workers: usize,
    cancel: CancelToken,
}

impl Engine {
    /// Load `config.yaml` under `layout`.
    ///
    /// Fails with `CoreError::NotInitialised` if `init` has not been run.
    pub fn load(layout: Layout, tools: Toolkit) -> Result<Self, SyncError> {
        let config = load_config_at(&layout)?;
        Ok(Self {
            workers: config.workers,
            layout,
            config,
            tools,
            cancel: CancelToken::new(),
        })
    }

    /// Override the configured worker count.
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(workers) = workers {
            self.workers = workers.max(1);
        }
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    // -----------------------------------------------------------------------
    // Init
    // -----------------------------------------------------------------------

    /// Second half of `init`: turn the tracking directory into a git
    /// repository, track it, commit, and create it on every remote.
    ///
    /// Refuses unless `config_is_ready` is true and the tracking directory
    /// is not already a git repository.
    pub async fn finish_init(&self, choice: &HostedChoice) -> Result<BatchReport, SyncError> {
        if !self.config.config_is_ready {
            return Err(SyncError::ConfigNotReady {
                path: self.layout.config_path(),
            });
        }
        let tracking = self.layout.tracking_dir();
        let probe = tracking.clone();
        if self.blocking(move |t| t.vcs.is_work_tree(&probe)).await? {
            return Err(SyncError::TrackingRepoExists { path: tracking });
        }

        let mut store = self.load_store()?;
        let options = self.resolve_options(choice).await?;
        let name = tracking_name();
        let resolved = resolve(&name, &options);

        let dir = tracking.clone();
        self.blocking(move |t| t.vcs.init(&dir)).await??;
        tracing::info!("initialised tracking repository at {}", tracking.display());

        if store.contains(&name) {
            store.set_remotes(&name, resolved.clone())?;
        } else {
            store.add(name.clone(), resolved.clone())?;
        }
        store::save_at(&self.layout, &store)?;
        let dir = tracking.clone();
        self.blocking(move |t| t.vcs.commit_all(&dir, "Initial commit: git-backup initialisation"))
            .await??;

        let job = RepoJob {
            repo: name.clone(),
            dir: tracking.clone(),
            remotes: Vec::new(),
        };
        let mut report = self.run_single("init", job, self.create_action(options)).await;

        let configured = self
            .configured_targets(&name, &tracking, &resolved, resolved.clone())
            .await?;
        store.set_remotes(&name, configured)?;
        report.store_commit = self.persist(&store, &format!("init {name}")).await?;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Batch commands over every tracked repository
    // -----------------------------------------------------------------------

    pub async fn fetch(&self) -> Result<BatchReport, SyncError> {
        let action = actions::Fetch {
            tools: self.tools.clone(),
        };
        self.run_all("fetch", Arc::new(action)).await
    }

    pub async fn status(&self) -> Result<BatchReport, SyncError> {
        let action = actions::Status {
            tools: self.tools.clone(),
        };
        self.run_all("status", Arc::new(action)).await
    }

    pub async fn push(&self) -> Result<BatchReport, SyncError> {
        let action = actions::Push {
            tools: self.tools.clone(),
        };
        self.run_all("push", Arc::new(action)).await
    }

    pub async fn foreach(&self, command: &str) -> Result<BatchReport, SyncError> {
        let action = actions::Foreach {
            tools: self.tools.clone(),
            command: command.to_owned(),
        };
        self.run_all("foreach", Arc::new(action)).await
    }

    /// Pull the tracking directory (`--ff-only`), then report drift.
    pub async fn update(&self) -> Result<BatchReport, SyncError> {
        self.ensure_ready().await?;
        let dir = self.layout.tracking_dir();
        let pulled = self.blocking(move |t| t.vcs.pull_ff_only(&dir)).await?;
        let unit = UnitReport::new(Unit::Pull, Outcome::from_tool(&pulled));

        let store = self.load_store()?;
        let drift = self.drift(&store)?;
        Ok(BatchReport {
            command: "update".to_owned(),
            drift: Some(drift),
            repos: vec![RepoReport::from_units(tracking_name(), vec![unit])],
            cancelled: self.cancel.is_cancelled(),
            store_commit: None,
        })
    }

    /// Tracked repositories and drift. Reads local state only.
    pub fn list(&self) -> Result<Listing, SyncError> {
        let store = self.load_store()?;
        let drift = self.drift(&store)?;
        Ok(Listing {
            repos: store.iter().cloned().collect(),
            drift,
        })
    }

    // -----------------------------------------------------------------------
    // Single-repository commands
    // -----------------------------------------------------------------------

    /// Track an existing local repository and create it on every remote.
    pub async fn create(&self, name: &str, choice: &HostedChoice) -> Result<BatchReport, SyncError> {
        self.create_inner("create", name, choice, false).await
    }

    /// Create an already tracked repository on every remote.
    pub async fn create_on_remote(
        &self,
        name: &str,
        choice: &HostedChoice,
    ) -> Result<BatchReport, SyncError> {
        self.create_inner("create-on-remote", name, choice, true).await
    }

    async fn create_inner(
        &self,
        command: &str,
        name: &str,
        choice: &HostedChoice,
        must_be_tracked: bool,
    ) -> Result<BatchReport, SyncError> {
        let name = RepoName::parse(name)?;
        let mut store = self.load_store()?;
        self.ensure_ready().await?;

        let existing = store.get(&name).map(|r| r.remotes.clone());
        match (&existing, must_be_tracked) {
            (None, true) => {
                return Err(CoreError::UnknownRepository { name: name.0 }.into());
            }
            (Some(_), false) => tracing::warn!("'{name}' is already tracked"),
            _ => {}
        }

        let dir = self.require_work_tree(&name).await?;
        let options = self.resolve_options(choice).await?;
        let resolved = resolve(&name, &options);
        let job = RepoJob {
            repo: name.clone(),
            dir: dir.clone(),
            remotes: existing.clone().unwrap_or_default(),
        };
        let mut report = self.run_single(command, job, self.create_action(options)).await;

        let fallback = existing.clone().unwrap_or_default();
        let configured = self.configured_targets(&name, &dir, &resolved, fallback).await?;
        if existing.is_some() {
            store.set_remotes(&name, configured)?;
        } else {
            store.add(name.clone(), configured)?;
        }
        report.store_commit = self.persist(&store, &format!("{command} {name}")).await?;
        Ok(report)
    }

    /// Replace the remotes of `name` with the resolved list.
    pub async fn reset_remotes(
        &self,
        name: &str,
        choice: &HostedChoice,
    ) -> Result<BatchReport, SyncError> {
        let (name, mut store, job, options) = self.prepare_remotes(name, choice).await?;
        let resolved = resolve(&name, &options);
        let dir = job.dir.clone();
        let action = actions::ResetRemotes {
            tools: self.tools.clone(),
            options,
        };
        let mut report = self.run_single("reset-remotes", job, Arc::new(action)).await;

        if let Some(current) = store.get(&name).map(|r| r.remotes.clone()) {
            let configured = self.configured_targets(&name, &dir, &resolved, current).await?;
            store.set_remotes(&name, configured)?;
            report.store_commit = self.persist(&store, &format!("reset-remotes {name}")).await?;
        } else {
            tracing::warn!("'{name}' is not tracked; remotes reset but nothing recorded");
        }
        Ok(report)
    }

    /// Add the resolved remotes `name` is missing.
    pub async fn add_remotes(
        &self,
        name: &str,
        choice: &HostedChoice,
    ) -> Result<BatchReport, SyncError> {
        let (name, mut store, job, options) = self.prepare_remotes(name, choice).await?;
        let resolved = resolve(&name, &options);
        let dir = job.dir.clone();
        let action = actions::AddRemotes {
            tools: self.tools.clone(),
            options,
        };
        let mut report = self.run_single("add-remotes", job, Arc::new(action)).await;

        if let Some(current) = store.get(&name).map(|r| r.remotes.clone()) {
            let configured = self.configured_targets(&name, &dir, &resolved, current).await?;
            store.set_remotes(&name, configured)?;
            report.store_commit = self.persist(&store, &format!("add-remotes {name}")).await?;
        } else {
            tracing::warn!("'{name}' is not tracked; remotes added but nothing recorded");
        }
        Ok(report)
    }

    async fn prepare_remotes(
        &self,
        name: &str,
        choice: &HostedChoice,
    ) -> Result<(RepoName, TrackingStore, RepoJob, ResolveOptions), SyncError> {
        let name = RepoName::parse(name)?;
        let store = self.load_store()?;
        self.ensure_ready().await?;
        let dir = self.require_work_tree(&name).await?;
        let options = self.resolve_options(choice).await?;
        let job = RepoJob {
            repo: name.clone(),
            dir,
            remotes: store.get(&name).map(|r| r.remotes.clone()).unwrap_or_default(),
        };
        Ok((name, store, job, options))
    }

    /// Clone `url` into `<root>/<name>`, track it, and reset its remotes.
    pub async fn clone_url(
        &self,
        name: &str,
        url: &str,
        choice: &HostedChoice,
    ) -> Result<BatchReport, SyncError> {
        self.clone_inner("clone-url", name, CloneSource::Url(url.to_owned()), choice)
            .await
    }

    /// Clone `<owner>/<name>` from the hosted service, track it, and reset
    /// its remotes. Without a known owner the hosted CLI's default applies.
    pub async fn clone_hosted(
        &self,
        name: &str,
        choice: &HostedChoice,
    ) -> Result<BatchReport, SyncError> {
        let owner = choice.owner.as_ref().or(self.config.gh_owner.as_ref());
        let slug = match owner {
            Some(owner) => format!("{owner}/{name}"),
            None => name.to_owned(),
        };
        self.clone_inner("clone-gh", name, CloneSource::Hosted(slug), choice)
            .await
    }

    async fn clone_inner(
        &self,
        command: &str,
        name: &str,
        source: CloneSource,
        choice: &HostedChoice,
    ) -> Result<BatchReport, SyncError> {
        let name = RepoName::parse(name)?;
        let mut store = self.load_store()?;
        self.ensure_ready().await?;

        let dir = self.layout.repo_path(&name);
        if dir.exists() {
            return Err(SyncError::AlreadyExists { name, path: dir });
        }
        let options = self.resolve_options(choice).await?;
        let resolved = resolve(&name, &options);
        let job = RepoJob {
            repo: name.clone(),
            dir: dir.clone(),
            remotes: Vec::new(),
        };
        let action = actions::CloneRepo {
            tools: self.tools.clone(),
            source,
            options,
        };
        let mut report = self.run_single(command, job, Arc::new(action)).await;

        if !dir.is_dir() {
            return Ok(report);
        }
        let existing = store.get(&name).map(|r| r.remotes.clone());
        let fallback = existing.clone().unwrap_or_default();
        let configured = self.configured_targets(&name, &dir, &resolved, fallback).await?;
        if existing.is_some() {
            store.set_remotes(&name, configured)?;
        } else {
            store.add(name.clone(), configured)?;
        }
        report.store_commit = self.persist(&store, &format!("{command} {name}")).await?;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn executor(&self) -> Executor {
        Executor::new(Arc::clone(&self.tools.vcs), self.workers, self.cancel.clone())
    }

    fn load_store(&self) -> Result<TrackingStore, SyncError> {
        Ok(store::load_at(&self.layout)?)
    }

    /// Drift between tracked and local sets; the tracking directory is
    /// excluded from both.
    fn drift(&self, store: &TrackingStore) -> Result<DriftReport, SyncError> {
        let mut tracked: BTreeSet<RepoName> = store.names();
        tracked.remove(&tracking_name());
        let local = scan::scan_at(&self.layout)?;
        let drift = compute_drift(&tracked, &local);
        for name in &drift.missing_locally {
            tracing::warn!("'{name}' is tracked but not present under {}", self.layout.repos_root().display());
        }
        for name in &drift.untracked {
            tracing::warn!("'{name}' is present but not tracked");
        }
        Ok(drift)
    }

    /// The tracking directory must be a git repository (i.e. `init` finished).
    async fn ensure_ready(&self) -> Result<(), SyncError> {
        let path = self.layout.tracking_dir();
        let probe = path.clone();
        if self.blocking(move |t| t.vcs.is_work_tree(&probe)).await? {
            Ok(())
        } else {
            Err(SyncError::InitIncomplete { path })
        }
    }

    async fn require_work_tree(&self, name: &RepoName) -> Result<PathBuf, SyncError> {
        let dir = self.layout.repo_path(name);
        if !dir.is_dir() {
            return Err(SyncError::NotPresent {
                name: name.clone(),
                path: dir,
            });
        }
        let probe = dir.clone();
        if !self.blocking(move |t| t.vcs.is_work_tree(&probe)).await? {
            return Err(SyncError::NotARepository {
                name: name.clone(),
                path: dir,
            });
        }
        Ok(dir)
    }

    /// What the store should record for `name` after its remotes were
    /// reconciled: the targets `dir` now holds under their default aliases.
    /// Keeps `fallback` if the remotes cannot be listed.
    async fn configured_targets(
        &self,
        name: &RepoName,
        dir: &Path,
        resolved: &[RemoteTarget],
        fallback: Vec<RemoteTarget>,
    ) -> Result<Vec<RemoteTarget>, SyncError> {
        let dir = dir.to_path_buf();
        match self.blocking(move |t| t.vcs.list_remotes(&dir)).await? {
            Ok(current) => Ok(reconcile::managed_targets(name, &current, resolved)),
            Err(e) => {
                tracing::warn!("'{name}': could not list remotes, keeping the recorded list: {e}");
                Ok(fallback)
            }
        }
    }

    /// SSH hosts from the config plus the hosted remote if enabled.
    ///
    /// The hosted owner comes from the choice, then `gh_owner`, then the
    /// hosted CLI's authenticated user.
    async fn resolve_options(&self, choice: &HostedChoice) -> Result<ResolveOptions, SyncError> {
        let options = ResolveOptions::from_config(&self.config, &self.layout);
        if !choice.enabled.unwrap_or(self.config.gh) {
            return Ok(options);
        }
        let owner = match choice.owner.clone().or_else(|| self.config.gh_owner.clone()) {
            Some(owner) => owner,
            None => self.blocking(|t| t.hosting.current_owner()).await??,
        };
        tracing::debug!("hosted remotes owned by {owner}");
        Ok(options.with_hosted_owner(Some(owner)))
    }

    fn create_action(&self, options: ResolveOptions) -> Arc<dyn RepoAction> {
        Arc::new(actions::Create {
            tools: self.tools.clone(),
            options,
            visibility: self.config.gh_visibility,
        })
    }

    async fn run_all(
        &self,
        command: &str,
        action: Arc<dyn RepoAction>,
    ) -> Result<BatchReport, SyncError> {
        let store = self.load_store()?;
        self.ensure_ready().await?;
        let drift = self.drift(&store)?;
        let jobs = store
            .iter()
            .map(|entry| RepoJob {
                repo: entry.name.clone(),
                dir: self.layout.repo_path(&entry.name),
                remotes: entry.remotes.clone(),
            })
            .collect();

        let repos = self.executor().run(jobs, action).await;
        Ok(BatchReport {
            command: command.to_owned(),
            drift: Some(drift),
            repos,
            cancelled: self.cancel.is_cancelled(),
            store_commit: None,
        })
    }

    async fn run_single(&self, command: &str, job: RepoJob, action: Arc<dyn RepoAction>) -> BatchReport {
        let repos = self.executor().run(vec![job], action).await;
        BatchReport {
            command: command.to_owned(),
            drift: None,
            repos,
            cancelled: self.cancel.is_cancelled(),
            store_commit: None,
        }
    }

    /// Save the store and, if anything was written, commit the tracking
    /// directory. A failed commit is returned as an outcome, not an error.
    async fn persist(&self, store: &TrackingStore, message: &str) -> Result<Option<Outcome>, SyncError> {
        let written = store::save_at(&self.layout, store)?;
        if written.is_empty() {
            return Ok(None);
        }
        let dir = self.layout.tracking_dir();
        let message = format!("git-backup: {message}");
        let committed = self.blocking(move |t| t.vcs.commit_all(&dir, &message)).await?;
        if let Err(e) = &committed {
            tracing::warn!("could not commit the tracking store: {e}");
        }
        Ok(Some(Outcome::from_tool(&committed)))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(Toolkit) -> T + Send + 'static,
    {
        let tools = self.tools.clone();
        Ok(tokio::task::spawn_blocking(move || f(tools)).await?)
    }
}

fn tracking_name() -> RepoName {
    RepoName::from(TRACKING_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::tools::fake::FakeTools;

    const READY: &str = "gh: false\nssh_remotes: [host1, host2]\nworkers: 2\nconfig_is_ready: true\n";

    struct Fixture {
        _tmp: TempDir,
        layout: Layout,
        fake: Arc<FakeTools>,
    }

    impl Fixture {
        /// Initialised root whose tracking directory is already a repository.
        fn ready(config: &str) -> Self {
            let fixture = Self::unfinished(config);
            fixture
                .fake
                .add_repo(&fixture.layout.tracking_dir(), &["main"], &[]);
            fixture
        }

        /// `init` ran but `finish_init` did not.
        fn unfinished(config: &str) -> Self {
            let tmp = TempDir::new().unwrap();
            let layout = Layout::at(tmp.path().join("repos"));
            store::init_at(&layout, false).unwrap();
            std::fs::write(layout.config_path(), config).unwrap();
            Self {
                _tmp: tmp,
                layout,
                fake: FakeTools::new(),
            }
        }

        fn engine(&self) -> Engine {
            Engine::load(self.layout.clone(), self.fake.toolkit()).unwrap()
        }

        fn track(&self, name: &str, remotes: Vec<RemoteTarget>) {
            let mut store = store::load_at(&self.layout).unwrap();
            store.add(RepoName::from(name), remotes).unwrap();
            store::save_at(&self.layout, &store).unwrap();
        }

        fn local(&self, name: &str, branches: &[&str]) -> PathBuf {
            let dir = self.layout.repo_path(&RepoName::from(name));
            self.fake.add_repo(&dir, branches, &[]);
            dir
        }

        /// Remotes of `dir` as the store would record them.
        fn configured(&self, name: &str, dir: &Path) -> Vec<RemoteTarget> {
            let name = RepoName::from(name);
            self.fake
                .remotes(dir)
                .iter()
                .filter_map(|r| r.target(&name).filter(|t| t.alias() == r.alias))
                .collect()
        }

        fn stored(&self, name: &str) -> Vec<RemoteTarget> {
            store::load_at(&self.layout)
                .unwrap()
                .get(&RepoName::from(name))
                .map(|r| r.remotes.clone())
                .unwrap_or_default()
        }
    }

    fn ssh(host: &str, repo: &str) -> RemoteTarget {
        RemoteTarget::ssh(host, format!("repos/{repo}.git"))
    }

    fn names(report: &BatchReport) -> Vec<&str> {
        report.repos.iter().map(|r| r.repo.as_str()).collect()
    }

    #[tokio::test]
    async fn fetch_reports_drift_and_skips_missing_repos() {
        let fx = Fixture::ready(READY);
        fx.track("a", vec![]);
        fx.track("b", vec![]);
        fx.local("b", &["main"]);
        fx.local("c", &["main"]);

        let report = fx.engine().fetch().await.unwrap();

        let drift = report.drift.as_ref().unwrap();
        assert_eq!(drift.missing_locally, vec![RepoName::from("a")]);
        assert_eq!(drift.untracked, vec![RepoName::from("c")]);
        assert_eq!(names(&report), vec!["a", "b"]);
        assert_eq!(report.repos[0].outcome, Outcome::skipped("not present locally"));
        assert!(report.repos[1].outcome.is_success());
        assert!(report.is_success());
        assert!(!fx.fake.calls().contains(&"fetch c".to_owned()));
    }

    #[tokio::test]
    async fn tracking_repository_is_part_of_every_batch() {
        let fx = Fixture::ready(READY);
        fx.track(TRACKING_DIR_NAME, vec![]);
        fx.track("proj", vec![]);
        fx.local("proj", &["main"]);

        let report = fx.engine().status().await.unwrap();
        assert_eq!(names(&report), vec![TRACKING_DIR_NAME, "proj"]);
        assert!(report.drift.unwrap().is_clean());
    }

    #[tokio::test]
    async fn one_failing_repository_fails_the_batch_but_not_the_others() {
        let fx = Fixture::ready(READY);
        for name in ["a", "b", "c"] {
            fx.track(name, vec![ssh("host1", name)]);
            fx.local(name, &["main"]);
        }
        fx.fake
            .fail_fetch_in(&fx.layout.repo_path(&RepoName::from("b")));

        let report = fx.engine().fetch().await.unwrap();
        assert!(!report.is_success());
        assert_eq!(report.counts(), (2, 1, 0));
        assert_eq!(report.failures().next().unwrap().repo.as_str(), "b");
    }

    #[tokio::test]
    async fn push_uses_tracked_remote_aliases() {
        let fx = Fixture::ready(READY);
        fx.track("proj", vec![ssh("host1", "proj"), RemoteTarget::hosted("me")]);
        fx.local("proj", &["main"]);

        let report = fx.engine().push().await.unwrap();
        assert!(report.is_success());
        let calls = fx.fake.calls();
        assert!(calls.contains(&"push proj host1 main".to_owned()));
        assert!(calls.contains(&"push proj github main".to_owned()));
    }

    #[tokio::test]
    async fn foreach_runs_in_every_repository() {
        let fx = Fixture::ready(READY);
        fx.track("a", vec![]);
        fx.track("b", vec![]);
        fx.local("a", &["main"]);
        fx.local("b", &["main"]);

        let report = fx.engine().foreach("git gc").await.unwrap();
        assert_eq!(report.counts(), (2, 0, 0));
        assert!(fx.fake.calls().contains(&"bash b git gc".to_owned()));
    }

    #[tokio::test]
    async fn corrupt_entry_fails_before_any_external_call() {
        let fx = Fixture::ready(READY);
        std::fs::write(
            fx.layout.entry_path(&RepoName::from("bad")),
            "name: bad\nremotes: [{kind: ftp}]\n",
        )
        .unwrap();

        let err = fx.engine().push().await.unwrap_err();
        assert!(err.is_config_error(), "got {err}");
        assert!(fx.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn unfinished_init_blocks_batch_commands() {
        let fx = Fixture::unfinished(READY);
        let err = fx.engine().fetch().await.unwrap_err();
        assert!(matches!(err, SyncError::InitIncomplete { .. }), "got {err}");
    }

    #[tokio::test]
    async fn cancelled_batch_records_every_repository_as_skipped() {
        let fx = Fixture::ready(READY);
        fx.track("a", vec![]);
        fx.local("a", &["main"]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = fx.engine().with_cancel(cancel).fetch().await.unwrap();
        assert!(report.cancelled);
        assert!(report.repos[0].outcome.is_cancelled());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn update_pulls_tracking_repository() {
        let fx = Fixture::ready(READY);
        fx.track("gone", vec![]);

        let report = fx.engine().update().await.unwrap();
        assert_eq!(fx.fake.calls(), vec![format!("pull {TRACKING_DIR_NAME}")]);
        assert_eq!(report.repos[0].repo.as_str(), TRACKING_DIR_NAME);
        assert_eq!(
            report.drift.unwrap().missing_locally,
            vec![RepoName::from("gone")]
        );
    }

    #[tokio::test]
    async fn create_tracks_creates_and_commits() {
        let fx = Fixture::ready(READY);
        fx.local("proj", &["main"]);

        let report = fx.engine().create("proj", &HostedChoice::default()).await.unwrap();

        assert!(report.is_success(), "{:?}", report.repos);
        assert_eq!(fx.stored("proj"), vec![ssh("host1", "proj"), ssh("host2", "proj")]);
        assert!(fx.fake.is_bare("host1:repos/proj.git"));
        assert!(fx.fake.is_bare("host2:repos/proj.git"));
        assert_eq!(report.store_commit, Some(Outcome::success("")));
        assert!(fx
            .fake
            .calls()
            .contains(&format!("commit {TRACKING_DIR_NAME} git-backup: create proj")));
    }

    #[tokio::test]
    async fn create_with_hosted_owner_from_the_cli_user() {
        let fx = Fixture::ready(READY);
        fx.local("proj", &["main"]);
        fx.fake.set_owner("me");
        let choice = HostedChoice {
            enabled: Some(true),
            owner: None,
        };

        fx.engine().create("proj", &choice).await.unwrap();
        assert!(fx.fake.is_hosted("me/proj"));
        assert_eq!(fx.stored("proj").last(), Some(&RemoteTarget::hosted("me")));
    }

    #[tokio::test]
    async fn hosted_enabled_without_any_owner_is_an_error() {
        let fx = Fixture::ready(READY);
        fx.local("proj", &["main"]);
        let choice = HostedChoice {
            enabled: Some(true),
            owner: None,
        };

        let err = fx.engine().create("proj", &choice).await.unwrap_err();
        assert!(matches!(err, SyncError::Tool(_)), "got {err}");
        assert!(fx.stored("proj").is_empty());
    }

    #[tokio::test]
    async fn create_requires_a_local_work_tree() {
        let fx = Fixture::ready(READY);
        let err = fx.engine().create("ghost", &HostedChoice::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotPresent { .. }));

        std::fs::create_dir(fx.layout.repo_path(&RepoName::from("plain"))).unwrap();
        let err = fx.engine().create("plain", &HostedChoice::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotARepository { .. }));
    }

    #[tokio::test]
    async fn create_on_remote_requires_tracking() {
        let fx = Fixture::ready(READY);
        fx.local("proj", &["main"]);
        let err = fx
            .engine()
            .create_on_remote("proj", &HostedChoice::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::UnknownRepository { .. })));
    }

    #[tokio::test]
    async fn create_on_remote_records_the_remotes_the_work_tree_holds() {
        let fx = Fixture::ready(READY);
        fx.track("proj", vec![RemoteTarget::ssh("host1", "custom/proj.git")]);
        let dir = fx.local("proj", &["main"]);

        fx.engine()
            .create_on_remote("proj", &HostedChoice::default())
            .await
            .unwrap();
        assert!(fx.fake.is_bare("host1:repos/proj.git"));
        assert_eq!(fx.stored("proj"), vec![ssh("host1", "proj"), ssh("host2", "proj")]);
        assert_eq!(fx.stored("proj"), fx.configured("proj", &dir));
    }

    #[tokio::test]
    async fn alias_conflict_records_the_remote_actually_configured() {
        let fx = Fixture::ready(READY);
        fx.track("proj", vec![]);
        let dir = fx.local("proj", &["main"]);
        fx.fake
            .add_repo(&dir, &["main"], &[("host1", "host1:custom/proj.git")]);

        let report = fx
            .engine()
            .add_remotes("proj", &HostedChoice::default())
            .await
            .unwrap();
        assert!(!report.is_success());
        assert_eq!(
            fx.stored("proj"),
            vec![ssh("host2", "proj"), RemoteTarget::ssh("host1", "custom/proj.git")]
        );
        assert!(!fx.stored("proj").contains(&ssh("host1", "proj")));
        assert_eq!(fx.stored("proj"), fx.configured("proj", &dir));
    }

    #[tokio::test]
    async fn reset_remotes_records_the_resolved_list() {
        let fx = Fixture::ready(READY);
        fx.track("proj", vec![ssh("old", "proj")]);
        let dir = fx.local("proj", &["main"]);
        fx.fake.add_repo(&dir, &["main"], &[("old", "old:repos/proj.git")]);

        let report = fx
            .engine()
            .reset_remotes("proj", &HostedChoice::default())
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(fx.stored("proj"), vec![ssh("host1", "proj"), ssh("host2", "proj")]);
        let aliases: Vec<String> = fx.fake.remotes(&dir).into_iter().map(|r| r.alias).collect();
        assert_eq!(aliases, vec!["host1", "host2"]);
    }

    #[tokio::test]
    async fn add_remotes_on_untracked_repo_records_nothing() {
        let fx = Fixture::ready(READY);
        let dir = fx.local("proj", &["main"]);

        let report = fx
            .engine()
            .add_remotes("proj", &HostedChoice::default())
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(fx.fake.remotes(&dir).len(), 2);
        assert!(report.store_commit.is_none());
        assert!(!fx.layout.entry_path(&RepoName::from("proj")).exists());
    }

    #[tokio::test]
    async fn clone_url_tracks_and_resets() {
        let fx = Fixture::ready(READY);
        fx.track("proj", vec![]);

        let report = fx
            .engine()
            .clone_url("proj", "https://example.com/proj.git", &HostedChoice::default())
            .await
            .unwrap();
        assert!(report.is_success(), "{:?}", report.repos);
        let dir = fx.layout.repo_path(&RepoName::from("proj"));
        assert!(dir.is_dir());
        assert_eq!(fx.stored("proj"), vec![ssh("host1", "proj"), ssh("host2", "proj")]);
        assert_eq!(fx.fake.remotes(&dir)[0].alias, "host1");
    }

    #[tokio::test]
    async fn clone_hosted_uses_configured_owner() {
        let fx = Fixture::ready(
            "gh: true\ngh_owner: team\nssh_remotes: []\nconfig_is_ready: true\n",
        );

        fx.engine()
            .clone_hosted("proj", &HostedChoice::default())
            .await
            .unwrap();
        assert!(fx.fake.calls().contains(&"gh repo clone team/proj proj".to_owned()));
        assert_eq!(fx.stored("proj"), vec![RemoteTarget::hosted("team")]);
    }

    #[tokio::test]
    async fn clone_into_existing_directory_is_refused() {
        let fx = Fixture::ready(READY);
        fx.local("proj", &["main"]);
        let err = fx
            .engine()
            .clone_url("proj", "https://example.com/proj.git", &HostedChoice::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn failed_clone_tracks_nothing() {
        let fx = Fixture::ready(READY);
        let report = fx
            .engine()
            .clone_url("proj", "https://example.com/missing.git", &HostedChoice::default())
            .await
            .unwrap();
        assert!(!report.is_success());
        assert!(fx.stored("proj").is_empty());
    }

    #[tokio::test]
    async fn failed_commit_is_only_a_warning() {
        let fx = Fixture::ready(READY);
        fx.local("proj", &["main"]);
        fx.fake.fail_commit();

        let report = fx.engine().create("proj", &HostedChoice::default()).await.unwrap();
        assert!(report.is_success());
        assert!(report.store_commit.unwrap().is_failure());
    }

    #[tokio::test]
    async fn finish_init_refuses_unready_config() {
        let fx = Fixture::unfinished("gh: false\nssh_remotes: []\nconfig_is_ready: false\n");
        let err = fx.engine().finish_init(&HostedChoice::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::ConfigNotReady { .. }));
        assert!(fx.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn finish_init_tracks_and_creates_the_tracking_repository() {
        let fx = Fixture::unfinished(READY);

        let report = fx.engine().finish_init(&HostedChoice::default()).await.unwrap();

        assert!(report.is_success(), "{:?}", report.repos);
        let calls = fx.fake.calls();
        assert_eq!(calls[0], format!("init {TRACKING_DIR_NAME}"));
        assert!(calls[1].starts_with(&format!("commit {TRACKING_DIR_NAME}")));
        assert!(fx.fake.is_bare(&format!("host1:repos/{TRACKING_DIR_NAME}.git")));
        assert_eq!(fx.stored(TRACKING_DIR_NAME).len(), 2);

        let err = fx.engine().finish_init(&HostedChoice::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::TrackingRepoExists { .. }));
    }

    #[tokio::test]
    async fn list_reads_local_state_only() {
        let fx = Fixture::ready(READY);
        fx.track("a", vec![ssh("host1", "a")]);
        fx.local("b", &["main"]);

        let listing = fx.engine().list().unwrap();
        assert_eq!(listing.repos.len(), 1);
        assert_eq!(listing.drift.untracked, vec![RepoName::from("b")]);
        assert!(fx.fake.calls().is_empty());
    }
}
