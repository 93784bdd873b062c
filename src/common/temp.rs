//! Work directory lifecycle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Prepare a work directory, removing it if it exists and creating it fresh.
///
/// Leftovers from an aborted run are never reused.
pub fn prepare_work_dir(parent_dir: &Path, name: &str) -> io::Result<PathBuf> {
    let work_dir = parent_dir.join(name);

    if work_dir.exists() {
        tracing::debug!(path = %work_dir.display(), "removing stale work directory");
        fs::remove_dir_all(&work_dir)?;
    }
    fs::create_dir_all(&work_dir)?;

    Ok(work_dir)
}

/// Remove a work directory. Missing directories are fine.
pub fn cleanup_work_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove work directory");
        }
    }
}

/// Remove everything inside `dir`, keeping `dir` itself.
pub fn clear_dir(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}
