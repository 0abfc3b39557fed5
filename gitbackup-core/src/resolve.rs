//! Remote target resolution.
//!
//! The resolved list is the canonical set of remotes a repository should
//! have: SSH hosts in configured order, then the hosted remote if enabled.
//! The order is stable for a given configuration; reconciliation compares
//! against it to decide what is missing.

use crate::config::{BackupConfig, Layout};
use crate::types::{RemoteTarget, RepoName};

/// Inputs to [`resolve`] for one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub ssh_hosts: Vec<String>,
    /// Owner of the hosted remote; `None` leaves it out.
    pub hosted_owner: Option<String>,
    /// Directory holding bare repositories on each SSH host.
    pub repos_dir_name: String,
}

impl ResolveOptions {
    /// SSH hosts and directory from config; no hosted remote.
    ///
    /// The hosted owner is a per-invocation choice and is set with
    /// [`ResolveOptions::with_hosted_owner`].
    pub fn from_config(config: &BackupConfig, layout: &Layout) -> Self {
        Self {
            ssh_hosts: config.ssh_remotes.clone(),
            hosted_owner: None,
            repos_dir_name: layout.repos_dir_name(),
        }
    }

    pub fn with_hosted_owner(mut self, owner: Option<String>) -> Self {
        self.hosted_owner = owner;
        self
    }

    pub fn ssh_remote_path(&self, repo: &RepoName) -> String {
        format!("{}/{}.git", self.repos_dir_name, repo)
    }
}

/// Ordered remote targets `repo` should have.
pub fn resolve(repo: &RepoName, options: &ResolveOptions) -> Vec<RemoteTarget> {
    let remote_path = options.ssh_remote_path(repo);
    let mut targets: Vec<RemoteTarget> = options
        .ssh_hosts
        .iter()
        .map(|host| RemoteTarget::ssh(host.clone(), remote_path.clone()))
        .collect();
    if let Some(owner) = &options.hosted_owner {
        targets.push(RemoteTarget::hosted(owner.clone()));
    }
    targets
}
