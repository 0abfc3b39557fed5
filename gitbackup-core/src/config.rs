//! Repositories-root layout and `config.yaml`.
//!
//! # Storage layout
//!
//! ```text
//! ~/repos/                         (repositories root)
//!   git-backup-tracking/           (tracking directory, a git repository)
//!     config.yaml
//!     tracked-repos/
//!       <repo>.yaml
//!   <repo>/                        (one working tree per repository)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::RepoName;

pub const DEFAULT_REPOS_DIR_NAME: &str = "repos";
pub const TRACKING_DIR_NAME: &str = "git-backup-tracking";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const TRACKED_REPOS_DIR_NAME: &str = "tracked-repos";
pub const DEFAULT_WORKERS: usize = 4;

/// Written by `init`; the user edits it before the tracking store is committed.
pub const DEFAULT_CONFIG_CONTENTS: &str = "\
# If set to true, GitHub is included as a remote by calling out to the gh CLI tool.
# The gh tool must be installed and authenticated for this to work.
gh: false
# Owner (user or organisation) for GitHub repositories. When unset, the
# authenticated gh user is used.
gh_owner: null
# Visibility used when creating GitHub repositories: private, public or internal.
gh_visibility: private
# One or more SSH remotes, e.g.
# ssh_remotes:
#  - example.com
# These remotes are used for every repository.
ssh_remotes: []
# Number of repositories processed in parallel by fetch/status/push/foreach.
workers: 4
# Change this to true when you are happy with your config.
config_is_ready: false
";

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Paths derived from the repositories root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<home>/repos`.
    pub fn from_home() -> Result<Self, CoreError> {
        let home = dirs::home_dir().ok_or(CoreError::HomeNotFound)?;
        Ok(Self::at(home.join(DEFAULT_REPOS_DIR_NAME)))
    }

    pub fn repos_root(&self) -> &Path {
        &self.root
    }

    /// Last component of the root; remote bare repositories live under a
    /// directory of the same name on each SSH host.
    pub fn repos_dir_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_REPOS_DIR_NAME.to_owned())
    }

    pub fn tracking_dir(&self) -> PathBuf {
        self.root.join(TRACKING_DIR_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.tracking_dir().join(CONFIG_FILE_NAME)
    }

    pub fn tracked_dir(&self) -> PathBuf {
        self.tracking_dir().join(TRACKED_REPOS_DIR_NAME)
    }

    /// `<root>/<repo>`: pure, no I/O.
    pub fn repo_path(&self, repo: &RepoName) -> PathBuf {
        self.root.join(&repo.0)
    }

    /// `<root>/git-backup-tracking/tracked-repos/<repo>.yaml`: pure, no I/O.
    pub fn entry_path(&self, repo: &RepoName) -> PathBuf {
        self.tracked_dir().join(format!("{}.yaml", repo.0))
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Visibility of repositories created on the hosted service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
    Internal,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Public => write!(f, "public"),
            Visibility::Internal => write!(f, "internal"),
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            other => Err(format!(
                "unknown visibility '{other}'; expected: private, public, internal"
            )),
        }
    }
}

/// Contents of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub gh: bool,
    #[serde(default)]
    pub gh_owner: Option<String>,
    #[serde(default)]
    pub gh_visibility: Visibility,
    pub ssh_remotes: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub config_is_ready: bool,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            gh: false,
            gh_owner: None,
            gh_visibility: Visibility::Private,
            ssh_remotes: Vec::new(),
            workers: DEFAULT_WORKERS,
            config_is_ready: false,
        }
    }
}

impl BackupConfig {
    fn validate(&self, path: &Path) -> Result<(), CoreError> {
        let invalid = |reason: String| CoreError::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        };
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1".to_owned()));
        }
        for (i, host) in self.ssh_remotes.iter().enumerate() {
            if host.trim().is_empty() {
                return Err(invalid(format!("ssh_remotes[{i}] is empty")));
            }
            if host.contains(char::is_whitespace) || host.contains('/') {
                return Err(invalid(format!("ssh_remotes[{i}] '{host}' is not a host name")));
            }
            if self.ssh_remotes[..i].contains(host) {
                return Err(invalid(format!("ssh_remotes lists '{host}' twice")));
            }
        }
        if let Some(owner) = &self.gh_owner {
            if owner.trim().is_empty() || owner.contains('/') {
                return Err(invalid(format!("gh_owner '{owner}' is not an owner name")));
            }
        }
        Ok(())
    }
}

/// Load and validate `config.yaml`.
///
/// Returns `CoreError::NotInitialised` if absent, `CoreError::Parse` if the
/// YAML is malformed, `CoreError::InvalidConfig` if values are unusable.
pub fn load_config_at(layout: &Layout) -> Result<BackupConfig, CoreError> {
    let path = layout.config_path();
    if !path.exists() {
        return Err(CoreError::NotInitialised { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: BackupConfig =
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
            path: path.clone(),
            source: e,
        })?;
    config.validate(&path)?;
    Ok(config)
}

/// Write [`DEFAULT_CONFIG_CONTENTS`] unless a config already exists.
///
/// Returns `true` if the file was written.
pub fn write_default_config_at(layout: &Layout) -> Result<bool, CoreError> {
    let path = layout.config_path();
    if path.exists() {
        return Ok(false);
    }
    let dir = layout.tracking_dir();
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    std::fs::write(&path, DEFAULT_CONFIG_CONTENTS).map_err(|e| io_err(&path, e))?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
