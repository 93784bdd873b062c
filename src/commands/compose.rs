//! Compose command - builds the image layer.

use anyhow::{Context, Result};

use crate::compose::{Apk, ImageComposer};
use crate::config::Config;

/// Execute the compose command.
pub fn cmd_compose(config: &Config) -> Result<()> {
    let apk = Apk::locate().context(
        "apk not found in PATH. Install apk-tools or apk.static (see 'pyro-rootfs preflight')",
    )?;

    let layer = ImageComposer::new(config, apk)
        .compose()
        .with_context(|| format!("Failed to compose layer from {}", config.base_rootfs.display()))?;

    println!();
    println!("Layer: {}", layer.path.display());
    layer.manifest.print();
    Ok(())
}
