//! Tracking store: one YAML file per tracked repository.
//!
//! # API pattern
//!
//! Load and save take an explicit [`Layout`]; callers derive it from
//! `--repos-dir` or `Layout::from_home()`. Tests always pass a `TempDir`.
//!
//! The store is loaded once per command, mutated in memory, and saved once
//! at the end. There is no locking; a command invocation is the only writer.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;

use crate::config::{self, Layout};
use crate::error::{io_err, CoreError};
use crate::types::{validate_remotes, RemoteTarget, RepoName, TrackedRepository};

/// In-memory view of every tracked repository, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingStore {
    repos: BTreeMap<RepoName, TrackedRepository>,
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    pub fn contains(&self, name: &RepoName) -> bool {
        self.repos.contains_key(name)
    }

    pub fn get(&self, name: &RepoName) -> Option<&TrackedRepository> {
        self.repos.get(name)
    }

    pub fn iter(&self) -> btree_map::Values<'_, RepoName, TrackedRepository> {
        self.repos.values()
    }

    pub fn names(&self) -> BTreeSet<RepoName> {
        self.repos.keys().cloned().collect()
    }

    /// Start tracking `name`. Fails if it is already tracked.
    pub fn add(
        &mut self,
        name: RepoName,
        remotes: Vec<RemoteTarget>,
    ) -> Result<&TrackedRepository, CoreError> {
        name.validate()?;
        validate_remotes(&name, &remotes)?;
        match self.repos.entry(name) {
            btree_map::Entry::Occupied(entry) => Err(CoreError::DuplicateRepository {
                name: entry.key().0.clone(),
            }),
            btree_map::Entry::Vacant(entry) => {
                let repo = TrackedRepository::new(entry.key().clone(), remotes);
                Ok(entry.insert(repo))
            }
        }
    }

    /// Replace the remote list of a tracked repository.
    pub fn set_remotes(
        &mut self,
        name: &RepoName,
        remotes: Vec<RemoteTarget>,
    ) -> Result<&TrackedRepository, CoreError> {
        validate_remotes(name, &remotes)?;
        let repo = self
            .repos
            .get_mut(name)
            .ok_or_else(|| CoreError::UnknownRepository {
                name: name.0.clone(),
            })?;
        if repo.remotes != remotes {
            repo.remotes = remotes;
            repo.updated_at = Utc::now();
        }
        Ok(repo)
    }

    fn insert_loaded(&mut self, path: &Path, repo: TrackedRepository) -> Result<(), CoreError> {
        repo.name.validate()?;
        validate_remotes(&repo.name, &repo.remotes)?;
        if self.repos.contains_key(&repo.name) {
            return Err(CoreError::DuplicateRepository {
                name: repo.name.0.clone(),
            });
        }
        tracing::debug!("loaded tracking entry {}", path.display());
        self.repos.insert(repo.name.clone(), repo);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

/// Create the tracking directory, `tracked-repos/`, and a default config.
///
/// Fails with `CoreError::AlreadyInitialised` if the tracking directory
/// exists and `resume` is false. With `resume`, existing files are kept.
pub fn init_at(layout: &Layout, resume: bool) -> Result<(), CoreError> {
    let tracking = layout.tracking_dir();
    if tracking.exists() && !resume {
        return Err(CoreError::AlreadyInitialised { path: tracking });
    }
    if resume && !layout.config_path().exists() {
        return Err(CoreError::NotInitialised {
            path: layout.config_path(),
        });
    }
    let tracked = layout.tracked_dir();
    std::fs::create_dir_all(&tracked).map_err(|e| io_err(&tracked, e))?;
    config::write_default_config_at(layout)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load every `tracked-repos/*.yaml` entry.
///
/// Returns `CoreError::NotInitialised` if the tracked directory is absent,
/// `CoreError::Parse` (with path + line context) for malformed YAML or remote
/// specs, `CoreError::NameMismatch` if an entry's name disagrees with its
/// file, and `CoreError::DuplicateRepository` / `DuplicateRemote` if the
/// uniqueness invariants are violated.
pub fn load_at(layout: &Layout) -> Result<TrackingStore, CoreError> {
    let dir = layout.tracked_dir();
    if !dir.is_dir() {
        return Err(CoreError::NotInitialised { path: dir });
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut store = TrackingStore::new();
    for entry in entries {
        let fname = entry.file_name();
        let fname = fname.to_string_lossy();
        if fname.starts_with('.') {
            continue;
        }
        let Some(stem) = fname.strip_suffix(".yaml") else {
            tracing::debug!("ignoring non-entry file {}", entry.path().display());
            continue;
        };
        let path = entry.path();
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let repo: TrackedRepository =
            serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse {
                path: path.clone(),
                source: e,
            })?;
        if repo.name.0 != stem {
            return Err(CoreError::NameMismatch {
                path,
                expected: stem.to_owned(),
                found: repo.name.0,
            });
        }
        store.insert_loaded(&path, repo)?;
    }
    Ok(store)
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Write every entry whose serialized form differs from what is on disk.
///
/// Write flow per entry: serialize → `.yaml.tmp` sibling → `rename`.
/// Returns the names of the entries actually written.
pub fn save_at(layout: &Layout, store: &TrackingStore) -> Result<Vec<RepoName>, CoreError> {
    let dir = layout.tracked_dir();
    if !dir.is_dir() {
        return Err(CoreError::NotInitialised { path: dir });
    }

    let mut written = Vec::new();
    for repo in store.iter() {
        let path = layout.entry_path(&repo.name);
        let yaml = serde_yaml::to_string(repo)?;
        if let Ok(existing) = std::fs::read_to_string(&path) {
            if existing == yaml {
                continue;
            }
        }
        let tmp_path = path.with_file_name(format!("{}.yaml.tmp", repo.name.0));
        std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_err(&path, e));
        }
        tracing::debug!("wrote tracking entry {}", path.display());
        written.push(repo.name.clone());
    }
    Ok(written)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
