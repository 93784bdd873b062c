//! Base distribution root: an extracted directory or a minirootfs tarball.

use std::path::Path;

use crate::common::copy_tree;
use crate::error::CompositionError;
use crate::process::Cmd;

fn is_tarball(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Populate `staging` with the base root.
pub fn unpack_base(base: &Path, staging: &Path) -> Result<(), CompositionError> {
    let unpack_err = |reason: String| CompositionError::BaseUnpack {
        path: base.to_path_buf(),
        reason,
    };

    if base.is_dir() {
        tracing::info!(base = %base.display(), "copying base root");
        let stats = copy_tree(base, staging).map_err(|e| unpack_err(e.to_string()))?;
        tracing::debug!(entries = stats.total(), "base root copied");
        return Ok(());
    }

    if base.is_file() && is_tarball(base) {
        tracing::info!(base = %base.display(), "extracting base tarball");
        Cmd::new("tar")
            .args(["-xzpf"])
            .arg_path(base)
            .arg("-C")
            .arg_path(staging)
            .arg("--numeric-owner")
            .error_msg("tar extraction failed")
            .run()
            .map_err(|e| unpack_err(format!("{:#}", e)))?;
        return Ok(());
    }

    Err(CompositionError::BaseMissing(base.to_path_buf()))
}
