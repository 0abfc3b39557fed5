//! External collaborators: git, the hosted-service CLI, SSH, and a shell.
//!
//! Every call is blocking and returns either the captured output or a
//! [`ToolError`] carrying the exit status and captured output. The engine
//! only talks to these traits; [`Toolkit::system`] wires the process-backed
//! implementations from [`process`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use gitbackup_core::{RemoteTarget, RepoName, Visibility};

pub mod process;

// ---------------------------------------------------------------------------
// Call results
// ---------------------------------------------------------------------------

/// Captured output of a successful call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// stdout followed by stderr, trimmed.
    pub fn text(&self) -> String {
        join_streams(&self.stdout, &self.stderr)
    }
}

/// A call that exited non-zero (`status: Some`) or never ran (`status: None`).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub struct ToolError {
    pub command: String,
    pub status: Option<i32>,
    pub output: String,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "`{}` exited with status {code}", self.command)?,
            None => write!(f, "`{}` could not be run", self.command)?,
        }
        if !self.output.is_empty() {
            write!(f, ": {}", self.output)?;
        }
        Ok(())
    }
}

pub type ToolResult = Result<ToolOutput, ToolError>;

pub(crate) fn join_streams(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim_end();
    let stderr = stderr.trim_end();
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, _) => stderr.to_owned(),
        (false, true) => stdout.to_owned(),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}

/// A remote as currently configured in a working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredRemote {
    pub alias: String,
    pub url: String,
}

impl ConfiguredRemote {
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            url: url.into(),
        }
    }

    /// Structural identity of this remote as a remote of `repo`, if its
    /// URL is recognised.
    pub fn target(&self, repo: &RepoName) -> Option<RemoteTarget> {
        RemoteTarget::from_url(&self.url, repo)
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// git primitives, each run with `dir` as the working directory.
pub trait Vcs: Send + Sync {
    fn is_work_tree(&self, dir: &Path) -> bool;
    fn fetch_all(&self, dir: &Path) -> ToolResult;
    fn status(&self, dir: &Path) -> ToolResult;
    fn list_branches(&self, dir: &Path) -> Result<Vec<String>, ToolError>;
    fn push(&self, dir: &Path, remote: &str, branch: &str) -> ToolResult;
    fn push_all(&self, dir: &Path, remote: &str) -> ToolResult;
    fn list_remotes(&self, dir: &Path) -> Result<Vec<ConfiguredRemote>, ToolError>;
    fn add_remote(&self, dir: &Path, alias: &str, url: &str) -> ToolResult;
    fn remove_remote(&self, dir: &Path, alias: &str) -> ToolResult;
    /// Clone `url` into `parent/dest`.
    fn clone_repo(&self, parent: &Path, url: &str, dest: &str) -> ToolResult;
    /// Succeeds if a repository answers at `url`.
    fn probe(&self, dir: &Path, url: &str) -> ToolResult;
    fn init(&self, dir: &Path) -> ToolResult;
    /// Stage everything under `dir` and commit it.
    fn commit_all(&self, dir: &Path, message: &str) -> ToolResult;
    fn pull_ff_only(&self, dir: &Path) -> ToolResult;
}

/// The hosted-repository service CLI.
pub trait Hosting: Send + Sync {
    /// Login of the authenticated user.
    fn current_owner(&self) -> Result<String, ToolError>;
    fn exists(&self, owner: &str, repo: &RepoName) -> Result<bool, ToolError>;
    fn create(
        &self,
        owner: &str,
        repo: &RepoName,
        visibility: Visibility,
        source: &Path,
    ) -> ToolResult;
    /// Clone `slug` (`owner/name` or `name`) into `parent/dest`.
    fn clone_repo(&self, parent: &Path, slug: &str, dest: &str) -> ToolResult;
}

/// Commands run on an SSH host.
pub trait SshTransport: Send + Sync {
    /// Create an empty bare repository at `remote_path` (relative to the remote home).
    fn create_bare(&self, host: &str, remote_path: &str) -> ToolResult;
}

/// Arbitrary user commands for `foreach`.
pub trait Shell: Send + Sync {
    fn run(&self, dir: &Path, command: &str) -> ToolResult;
}

/// The full set of collaborators handed to the engine.
#[derive(Clone)]
pub struct Toolkit {
    pub vcs: Arc<dyn Vcs>,
    pub hosting: Arc<dyn Hosting>,
    pub ssh: Arc<dyn SshTransport>,
    pub shell: Arc<dyn Shell>,
}

impl Toolkit {
    /// `git`, `gh`, `ssh` and `bash` from `$PATH`.
    pub fn system() -> Self {
        Self {
            vcs: Arc::new(process::GitCli),
            hosting: Arc::new(process::GhCli),
            ssh: Arc::new(process::SshCli),
            shell: Arc::new(process::BashShell),
        }
    }
}

impl fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolkit").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod fake;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_display_includes_status_and_output() {
        let err = ToolError {
            command: "git push host2 main".into(),
            status: Some(128),
            output: "fatal: unable to access".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git push host2 main"));
        assert!(msg.contains("128"));
        assert!(msg.contains("unable to access"));
    }

    #[test]
    fn text_joins_streams() {
        let out = ToolOutput {
            stdout: "a\n".into(),
            stderr: "b\n".into(),
        };
        assert_eq!(out.text(), "a\nb");
        assert_eq!(ToolOutput::from_stdout("only\n").text(), "only");
    }

    #[test]
    fn configured_remote_identity_comes_from_url() {
        let remote = ConfiguredRemote::new("backup", "host1:repos/proj.git");
        assert_eq!(
            remote.target(&RepoName::from("proj")),
            Some(RemoteTarget::ssh("host1", "repos/proj.git"))
        );
    }
}
