//! In-memory collaborators for unit tests.
//!
//! Working trees are real directories (the executor checks `is_dir`), but
//! their git state lives in [`FakeTools`]. Every mutating call is appended
//! to a call log as a short string, e.g. `push proj host1 main`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use gitbackup_core::{RepoName, Visibility, HOSTED_DOMAIN};

use super::{ConfiguredRemote, Hosting, Shell, SshTransport, ToolError, ToolOutput, ToolResult, Toolkit, Vcs};
use crate::executor::CancelToken;

#[derive(Debug, Default, Clone)]
struct FakeRepo {
    branches: Vec<String>,
    remotes: Vec<ConfiguredRemote>,
}

#[derive(Default)]
struct State {
    repos: BTreeMap<PathBuf, FakeRepo>,
    owner: Option<String>,
    hosted: BTreeSet<String>,
    bare: BTreeSet<String>,
    fail_push: BTreeSet<String>,
    fail_add: BTreeSet<String>,
    fail_remove: BTreeSet<String>,
    fail_fetch: BTreeSet<PathBuf>,
    fail_ssh_hosts: BTreeSet<String>,
    fail_commit: bool,
    cancel_on: Option<(String, CancelToken)>,
    calls: Vec<String>,
}

pub(crate) struct FakeTools {
    state: Mutex<State>,
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn failed(command: String) -> ToolError {
    ToolError {
        command,
        status: Some(1),
        output: "simulated failure".to_owned(),
    }
}

impl FakeTools {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Log `call` and return it, cancelling the registered token if it matches.
    fn record(&self, state: &mut State, call: String) -> String {
        if let Some((needle, token)) = &state.cancel_on {
            if call.contains(needle.as_str()) {
                token.cancel();
            }
        }
        state.calls.push(call.clone());
        call
    }

    // -- setup --------------------------------------------------------------

    /// Create `dir` on disk and register it as a work tree.
    pub fn add_repo(&self, dir: &Path, branches: &[&str], remotes: &[(&str, &str)]) {
        std::fs::create_dir_all(dir).unwrap();
        let repo = FakeRepo {
            branches: branches.iter().map(|b| (*b).to_owned()).collect(),
            remotes: remotes
                .iter()
                .map(|(alias, url)| ConfiguredRemote::new(*alias, *url))
                .collect(),
        };
        self.lock().repos.insert(dir.to_path_buf(), repo);
    }

    pub fn set_owner(&self, owner: &str) {
        self.lock().owner = Some(owner.to_owned());
    }

    pub fn hosted_exists(&self, slug: &str) {
        self.lock().hosted.insert(slug.to_owned());
    }

    pub fn bare_exists(&self, url: &str) {
        self.lock().bare.insert(url.to_owned());
    }

    pub fn fail_push_to(&self, remote: &str) {
        self.lock().fail_push.insert(remote.to_owned());
    }

    pub fn fail_add_remote(&self, alias: &str) {
        self.lock().fail_add.insert(alias.to_owned());
    }

    pub fn fail_remove_remote(&self, alias: &str) {
        self.lock().fail_remove.insert(alias.to_owned());
    }

    pub fn fail_fetch_in(&self, dir: &Path) {
        self.lock().fail_fetch.insert(dir.to_path_buf());
    }

    pub fn fail_ssh_host(&self, host: &str) {
        self.lock().fail_ssh_hosts.insert(host.to_owned());
    }

    pub fn fail_commit(&self) {
        self.lock().fail_commit = true;
    }

    /// Cancel `token` as soon as a call containing `needle` is made.
    pub fn cancel_on(&self, needle: &str, token: CancelToken) {
        self.lock().cancel_on = Some((needle.to_owned(), token));
    }

    // -- inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn remotes(&self, dir: &Path) -> Vec<ConfiguredRemote> {
        self.lock()
            .repos
            .get(dir)
            .map(|r| r.remotes.clone())
            .unwrap_or_default()
    }

    pub fn is_hosted(&self, slug: &str) -> bool {
        self.lock().hosted.contains(slug)
    }

    pub fn is_bare(&self, url: &str) -> bool {
        self.lock().bare.contains(url)
    }

    // -- wiring -------------------------------------------------------------

    pub fn vcs(self: &Arc<Self>) -> Arc<dyn Vcs> {
        Arc::clone(self) as Arc<dyn Vcs>
    }

    pub fn toolkit(self: &Arc<Self>) -> Toolkit {
        Toolkit {
            vcs: Arc::clone(self) as Arc<dyn Vcs>,
            hosting: Arc::clone(self) as Arc<dyn Hosting>,
            ssh: Arc::clone(self) as Arc<dyn SshTransport>,
            shell: Arc::clone(self) as Arc<dyn Shell>,
        }
    }

    fn clone_into(&self, parent: &Path, url: &str, dest: &str, call: String) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, call);
        let dir = parent.join(dest);
        if dir.exists() || url.contains("missing") {
            return Err(failed(call));
        }
        std::fs::create_dir_all(&dir).map_err(|e| ToolError {
            command: call.clone(),
            status: None,
            output: e.to_string(),
        })?;
        state.repos.insert(
            dir,
            FakeRepo {
                branches: vec!["main".to_owned()],
                remotes: vec![ConfiguredRemote::new("origin", url)],
            },
        );
        Ok(ToolOutput::default())
    }
}

impl Vcs for FakeTools {
    fn is_work_tree(&self, dir: &Path) -> bool {
        self.lock().repos.contains_key(dir)
    }

    fn fetch_all(&self, dir: &Path) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("fetch {}", dir_name(dir)));
        if state.fail_fetch.contains(dir) {
            return Err(failed(call));
        }
        Ok(ToolOutput::from_stdout("fetched"))
    }

    fn status(&self, dir: &Path) -> ToolResult {
        let mut state = self.lock();
        self.record(&mut state, format!("status {}", dir_name(dir)));
        Ok(ToolOutput::from_stdout("nothing to commit, working tree clean"))
    }

    fn list_branches(&self, dir: &Path) -> Result<Vec<String>, ToolError> {
        let state = self.lock();
        Ok(state
            .repos
            .get(dir)
            .map(|r| r.branches.clone())
            .unwrap_or_default())
    }

    fn push(&self, dir: &Path, remote: &str, branch: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("push {} {remote} {branch}", dir_name(dir)));
        if state.fail_push.contains(remote) {
            return Err(failed(call));
        }
        Ok(ToolOutput::default())
    }

    fn push_all(&self, dir: &Path, remote: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("push --all {} {remote}", dir_name(dir)));
        if state.fail_push.contains(remote) {
            return Err(failed(call));
        }
        Ok(ToolOutput::default())
    }

    fn list_remotes(&self, dir: &Path) -> Result<Vec<ConfiguredRemote>, ToolError> {
        let state = self.lock();
        state
            .repos
            .get(dir)
            .map(|r| r.remotes.clone())
            .ok_or_else(|| failed(format!("remote -v {}", dir_name(dir))))
    }

    fn add_remote(&self, dir: &Path, alias: &str, url: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("remote add {} {alias} {url}", dir_name(dir)));
        if state.fail_add.contains(alias) {
            return Err(failed(call));
        }
        let repo = state.repos.get_mut(dir).ok_or_else(|| failed(call.clone()))?;
        if repo.remotes.iter().any(|r| r.alias == alias) {
            return Err(failed(call));
        }
        repo.remotes.push(ConfiguredRemote::new(alias, url));
        Ok(ToolOutput::default())
    }

    fn remove_remote(&self, dir: &Path, alias: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("remote remove {} {alias}", dir_name(dir)));
        if state.fail_remove.contains(alias) {
            return Err(failed(call));
        }
        let repo = state.repos.get_mut(dir).ok_or_else(|| failed(call.clone()))?;
        repo.remotes.retain(|r| r.alias != alias);
        Ok(ToolOutput::default())
    }

    fn clone_repo(&self, parent: &Path, url: &str, dest: &str) -> ToolResult {
        self.clone_into(parent, url, dest, format!("clone {url} {dest}"))
    }

    fn probe(&self, _dir: &Path, url: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("ls-remote {url}"));
        if state.bare.contains(url) {
            Ok(ToolOutput::default())
        } else {
            Err(ToolError {
                command: call,
                status: Some(128),
                output: "repository not found".to_owned(),
            })
        }
    }

    fn init(&self, dir: &Path) -> ToolResult {
        let mut state = self.lock();
        self.record(&mut state, format!("init {}", dir_name(dir)));
        state.repos.entry(dir.to_path_buf()).or_default();
        Ok(ToolOutput::default())
    }

    fn commit_all(&self, dir: &Path, message: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("commit {} {message}", dir_name(dir)));
        if state.fail_commit {
            return Err(failed(call));
        }
        Ok(ToolOutput::default())
    }

    fn pull_ff_only(&self, dir: &Path) -> ToolResult {
        let mut state = self.lock();
        self.record(&mut state, format!("pull {}", dir_name(dir)));
        Ok(ToolOutput::from_stdout("Already up to date."))
    }
}

impl Hosting for FakeTools {
    fn current_owner(&self) -> Result<String, ToolError> {
        let mut state = self.lock();
        let call = self.record(&mut state, "gh api user".to_owned());
        state.owner.clone().ok_or_else(|| failed(call))
    }

    fn exists(&self, owner: &str, repo: &RepoName) -> Result<bool, ToolError> {
        let mut state = self.lock();
        let slug = format!("{owner}/{repo}");
        self.record(&mut state, format!("gh repo view {slug}"));
        Ok(state.hosted.contains(&slug))
    }

    fn create(
        &self,
        owner: &str,
        repo: &RepoName,
        visibility: Visibility,
        _source: &Path,
    ) -> ToolResult {
        let mut state = self.lock();
        let slug = format!("{owner}/{repo}");
        let call = self.record(&mut state, format!("gh repo create {slug} --{visibility}"));
        if !state.hosted.insert(slug) {
            return Err(failed(call));
        }
        Ok(ToolOutput::default())
    }

    fn clone_repo(&self, parent: &Path, slug: &str, dest: &str) -> ToolResult {
        let full = match slug.split_once('/') {
            Some(_) => slug.to_owned(),
            None => {
                let owner = self.lock().owner.clone().unwrap_or_default();
                format!("{owner}/{slug}")
            }
        };
        let url = format!("git@{HOSTED_DOMAIN}:{full}.git");
        self.clone_into(parent, &url, dest, format!("gh repo clone {slug} {dest}"))
    }
}

impl SshTransport for FakeTools {
    fn create_bare(&self, host: &str, remote_path: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("ssh {host} init --bare {remote_path}"));
        if state.fail_ssh_hosts.contains(host) {
            return Err(failed(call));
        }
        if !state.bare.insert(format!("{host}:{remote_path}")) {
            return Err(failed(call));
        }
        Ok(ToolOutput::default())
    }
}

impl Shell for FakeTools {
    fn run(&self, dir: &Path, command: &str) -> ToolResult {
        let mut state = self.lock();
        let call = self.record(&mut state, format!("bash {} {command}", dir_name(dir)));
        if command.contains("false") {
            return Err(failed(call));
        }
        Ok(ToolOutput::from_stdout(format!("ran in {}", dir_name(dir))))
    }
}
