//! Local scanner: which repository directories exist under the repos root.

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::{Layout, TRACKING_DIR_NAME};
use crate::error::{io_err, CoreError};
use crate::types::RepoName;

/// Directory names directly under `root`, minus `exclude`.
///
/// Only real directories count: symlinks, files and hidden entries (leading
/// `.`) are skipped. Fails with `CoreError::Io` if `root` is unreadable.
pub fn scan(root: &Path, exclude: &[&str]) -> Result<BTreeSet<RepoName>, CoreError> {
    let entries = std::fs::read_dir(root).map_err(|e| io_err(root, e))?;
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(root, e))?;
        // `DirEntry::file_type` does not follow symlinks.
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || exclude.contains(&name.as_str()) {
            continue;
        }
        names.insert(RepoName::from(name));
    }
    Ok(names)
}

/// [`scan`] of the layout's root, excluding the tracking directory.
pub fn scan_at(layout: &Layout) -> Result<BTreeSet<RepoName>, CoreError> {
    scan(layout.repos_root(), &[TRACKING_DIR_NAME])
}
