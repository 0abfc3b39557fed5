//! Error types for gitbackup-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from tracking-store, config and scan operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A tracking entry whose `name` field disagrees with its file name.
    #[error("tracking entry {path} is named '{found}' but its file implies '{expected}'")]
    NameMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("invalid repository name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("repository '{name}' is already tracked")]
    DuplicateRepository { name: String },

    #[error("repository '{name}' lists more than one remote for {slot}")]
    DuplicateRemote { name: String, slot: String },

    #[error("repository '{name}' is not tracked")]
    UnknownRepository { name: String },

    /// `config.yaml` parsed but holds values that cannot be used.
    #[error("invalid config at {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// The tracking directory or its config file does not exist.
    #[error("tracking store not found at {path}; run `git-backup init` first")]
    NotInitialised { path: PathBuf },

    #[error("tracking directory {path} already exists")]
    AlreadyInitialised { path: PathBuf },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/repos/`.
    #[error("cannot determine home directory; set $HOME or pass --repos-dir")]
    HomeNotFound,
}

impl CoreError {
    /// Configuration-level errors abort a command before any external call.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CoreError::Parse { .. }
                | CoreError::NameMismatch { .. }
                | CoreError::InvalidName { .. }
                | CoreError::DuplicateRepository { .. }
                | CoreError::DuplicateRemote { .. }
                | CoreError::InvalidConfig { .. }
                | CoreError::NotInitialised { .. }
        )
    }
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
