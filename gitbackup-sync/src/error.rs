//! Error types for gitbackup-sync.

use std::path::PathBuf;

use thiserror::Error;

use gitbackup_core::{CoreError, RepoName};

use crate::reconcile::ReconcileReport;
use crate::tools::ToolError;

/// Errors that abort a command or a reconciliation.
///
/// Per-repository failures inside a batch never surface here; the executor
/// records them as [`crate::Outcome::Failure`] entries instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Tracking store, config or scan error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An external tool exited non-zero or could not be started.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Removing an existing remote failed; additions were not attempted.
    #[error("could not remove remote '{alias}' (already removed: {removed:?}): {source}")]
    RemoveRemote {
        alias: String,
        removed: Vec<String>,
        #[source]
        source: ToolError,
    },

    /// Some resolved targets were not added. Removals are not rolled back.
    #[error("remotes of '{}' only partly reconciled: {}", .0.repo, .0.summary())]
    PartialReconcile(Box<ReconcileReport>),

    #[error("'{name}' is not present at {path}")]
    NotPresent { name: RepoName, path: PathBuf },

    #[error("'{name}' at {path} is not a git repository")]
    NotARepository { name: RepoName, path: PathBuf },

    #[error("cannot clone '{name}': {path} already exists")]
    AlreadyExists { name: RepoName, path: PathBuf },

    /// `config_is_ready` is still false.
    #[error("config at {path} is not marked ready; set `config_is_ready: true` and run `git-backup init --resume`")]
    ConfigNotReady { path: PathBuf },

    /// The tracking directory exists but `init` never finished.
    #[error("tracking directory {path} is not a git repository; run `git-backup init --resume`")]
    InitIncomplete { path: PathBuf },

    /// The tracking directory is already a git repository.
    #[error("tracking directory {path} is already a git repository")]
    TrackingRepoExists { path: PathBuf },

    /// A blocking worker panicked or was aborted.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Configuration-level errors abort before any external call.
    pub fn is_config_error(&self) -> bool {
        match self {
            SyncError::Core(e) => e.is_config_error(),
            SyncError::ConfigNotReady { .. } | SyncError::InitIncomplete { .. } => true,
            _ => false,
        }
    }
}
