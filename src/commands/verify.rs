//! Verify command - checks an exported rootfs.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::compose::Apk;
use crate::verify;

/// Execute the verify command.
pub fn cmd_verify(rootfs: &Path) -> Result<()> {
    if !rootfs.is_dir() {
        bail!("Rootfs not found: {}", rootfs.display());
    }

    let result = verify::verify_rootfs(rootfs, Apk::CACHE_DIRS)
        .with_context(|| format!("Failed to inspect {}", rootfs.display()))?;
    result.print();

    if !result.passed() {
        bail!(
            "Verification failed: {} problem(s) in {}",
            result.failures.len(),
            rootfs.display()
        );
    }
    Ok(())
}
