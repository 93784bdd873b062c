//! Show command - displays information.

use anyhow::{bail, Result};

use crate::compose::LayerManifest;
use crate::config::Config;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the composed layer manifest
    Layer,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Layer => {
            let manifest_path = config.manifest_path();
            if !manifest_path.exists() {
                bail!("Layer manifest not found. Run 'pyro-rootfs compose' first.");
            }
            println!("Layer: {}", config.layer_dir().display());
            LayerManifest::read(&manifest_path)?.print();
        }
    }
    Ok(())
}
