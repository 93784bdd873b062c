//! Export command - flattens the layer into a guest rootfs.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::export::RootfsExporter;

/// Layer to export: the explicit `--layer`, or the composed layer from the
/// configuration. Configuration is only loaded when no layer is given, so a
/// bad `PYRO_*` variable cannot break an export inside the image.
pub fn resolve_layer(
    layer: Option<PathBuf>,
    load: impl FnOnce() -> Result<Config>,
) -> Result<PathBuf> {
    match layer {
        Some(layer) => Ok(layer),
        None => Ok(load()?.layer_dir()),
    }
}

/// Execute the export command.
pub fn cmd_export(layer: &Path, destination: &Path) -> Result<()> {
    let report = RootfsExporter::new(layer, destination)
        .export()
        .with_context(|| {
            format!(
                "Export to {} failed; discard the destination and retry on an empty one",
                destination.display()
            )
        })?;

    println!();
    println!("Exported {} to {}", layer.display(), destination.display());
    println!("  Copied:       {}", report.copied.join(" "));
    println!("  Mount points: {}", report.created.join(" "));
    println!(
        "  Entries:      {} dirs, {} files, {} symlinks, {} hard links, {} special",
        report.stats.dirs,
        report.stats.files,
        report.stats.symlinks,
        report.stats.hardlinks,
        report.stats.special
    );
    if !report.skipped.is_empty() {
        println!("  Not exported: {}", report.skipped.join(" "));
    }
    Ok(())
}
