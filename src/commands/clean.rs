//! Clean command - removes composition outputs.

use anyhow::{Context, Result};
use std::fs;

use crate::config::Config;

/// Execute the clean command.
pub fn cmd_clean(config: &Config) -> Result<()> {
    let mut cleaned = false;

    let [old_layer, old_manifest] = config.set_aside_paths();
    for dir in [config.staging_dir(), config.layer_dir(), old_layer] {
        if dir.exists() {
            println!("Removing {}...", dir.display());
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
            cleaned = true;
        }
    }

    for manifest in [config.manifest_path(), old_manifest] {
        if manifest.exists() {
            println!("Removing {}...", manifest.display());
            fs::remove_file(&manifest)
                .with_context(|| format!("Failed to remove {}", manifest.display()))?;
            cleaned = true;
        }
    }

    if cleaned {
        println!("Clean complete.");
    } else {
        println!("Nothing to clean.");
    }
    Ok(())
}
