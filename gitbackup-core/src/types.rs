//! Domain types for the tracking store.
//!
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Alias given to the hosted-service remote in every repository.
pub const HOSTED_ALIAS: &str = "github";

/// SSH host of the hosted service, used to build and recognise its URLs.
pub const HOSTED_DOMAIN: &str = "github.com";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a repository; also the name of its directory under the repos root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoName(pub String);

impl RepoName {
    /// Validate a user-supplied name.
    ///
    /// A name must be non-empty, must not start with `.` (hidden entries are
    /// never scanned) and must be a single path component.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let name = Self(raw.to_owned());
        name.validate()?;
        Ok(name)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let reason = if self.0.is_empty() {
            Some("name is empty")
        } else if self.0.starts_with('.') {
            Some("name must not start with '.'")
        } else if self.0.contains('/') || self.0.contains('\\') {
            Some("name must be a single directory name")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(CoreError::InvalidName {
                name: self.0.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Remote targets
// ---------------------------------------------------------------------------

/// A destination a repository should have as a git remote.
///
/// Equality is structural on the variant and its fields; the local alias a
/// remote happens to be registered under is not part of identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteTarget {
    /// A bare repository on an SSH host, `remote_path` relative to the remote home.
    Ssh { host: String, remote_path: String },
    /// A repository on the hosted service, owned by `owner`.
    Hosted { owner: String },
}

/// The slot a target occupies in a repository's remote list.
///
/// Two targets in the same slot are duplicates: one remote per SSH host and
/// at most one hosted remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteSlot<'a> {
    Ssh(&'a str),
    Hosted,
}

impl fmt::Display for RemoteSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteSlot::Ssh(host) => write!(f, "ssh:{host}"),
            RemoteSlot::Hosted => write!(f, "hosted"),
        }
    }
}

impl RemoteTarget {
    pub fn ssh(host: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self::Ssh {
            host: host.into(),
            remote_path: remote_path.into(),
        }
    }

    pub fn hosted(owner: impl Into<String>) -> Self {
        Self::Hosted {
            owner: owner.into(),
        }
    }

    pub fn slot(&self) -> RemoteSlot<'_> {
        match self {
            RemoteTarget::Ssh { host, .. } => RemoteSlot::Ssh(host),
            RemoteTarget::Hosted { .. } => RemoteSlot::Hosted,
        }
    }

    /// Default alias for this target in a local repository.
    pub fn alias(&self) -> &str {
        match self {
            RemoteTarget::Ssh { host, .. } => host,
            RemoteTarget::Hosted { .. } => HOSTED_ALIAS,
        }
    }

    /// Fetch/push URL of this target for `repo`.
    pub fn url(&self, repo: &RepoName) -> String {
        match self {
            RemoteTarget::Ssh { host, remote_path } => format!("{host}:{remote_path}"),
            RemoteTarget::Hosted { owner } => format!("git@{HOSTED_DOMAIN}:{owner}/{repo}.git"),
        }
    }

    /// Recognise a remote URL of `repo` as a target.
    ///
    /// Accepts scp-like `host:path`, `ssh://[user@]host/path`, and hosted URLs
    /// in either `git@github.com:owner/name` or `https://github.com/owner/name`
    /// form. A hosted URL only matches when `name` is `repo`; a hosted target
    /// carries no path, so another repository of the same owner would
    /// otherwise compare equal. Returns `None` for anything else (local paths,
    /// other protocols).
    pub fn from_url(url: &str, repo: &RepoName) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        if let Some(rest) = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://")) {
            let (host, path) = rest.split_once('/')?;
            if host != HOSTED_DOMAIN {
                return None;
            }
            return hosted_owner(path, repo).map(Self::hosted);
        }

        if let Some(rest) = url.strip_prefix("ssh://") {
            let (authority, path) = rest.split_once('/')?;
            let host = authority.rsplit('@').next().unwrap_or(authority);
            if host.is_empty() || path.is_empty() {
                return None;
            }
            if host == HOSTED_DOMAIN {
                return hosted_owner(path, repo).map(Self::hosted);
            }
            return Some(Self::ssh(host, path));
        }

        if url.contains("://") {
            return None;
        }

        // scp-like: [user@]host:path, where host contains no '/'
        let (authority, path) = url.split_once(':')?;
        if authority.is_empty() || authority.contains('/') || path.is_empty() {
            return None;
        }
        let (user, host) = match authority.split_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, authority),
        };
        if host == HOSTED_DOMAIN {
            return hosted_owner(path, repo).map(Self::hosted);
        }
        let host = match user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_owned(),
        };
        Some(Self::ssh(host, path))
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteTarget::Ssh { host, remote_path } => write!(f, "ssh({host}:{remote_path})"),
            RemoteTarget::Hosted { owner } => write!(f, "hosted({owner})"),
        }
    }
}

fn hosted_owner(path: &str, repo: &RepoName) -> Option<String> {
    let (owner, name) = path.trim_start_matches('/').split_once('/')?;
    let name = name.trim_end_matches('/').trim_end_matches(".git");
    if owner.is_empty() || name != repo.as_str() {
        return None;
    }
    Some(owner.to_owned())
}

/// Reject remote lists with two targets in the same slot.
pub fn validate_remotes(repo: &RepoName, remotes: &[RemoteTarget]) -> Result<(), CoreError> {
    for (i, target) in remotes.iter().enumerate() {
        if remotes[..i].iter().any(|seen| seen.slot() == target.slot()) {
            return Err(CoreError::DuplicateRemote {
                name: repo.0.clone(),
                slot: target.slot().to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tracked repository
// ---------------------------------------------------------------------------

/// A repository recorded in the tracking store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRepository {
    pub name: RepoName,
    #[serde(default)]
    pub remotes: Vec<RemoteTarget>,
    pub tracked_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedRepository {
    pub fn new(name: RepoName, remotes: Vec<RemoteTarget>) -> Self {
        let now = Utc::now();
        Self {
            name,
            remotes,
            tracked_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
