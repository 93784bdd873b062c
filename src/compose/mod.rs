//! Image composer.
//!
//! Builds the composed layer from a base distribution root:
//!
//! 1. untrusted group (fixed gid)
//! 2. untrusted user (fixed uid, no password, no home, no shell)
//! 3. supervisor binary at `/bin/pyrod`
//! 4. language runtime via the package manager
//!
//! Everything happens in a staging directory that replaces the previous layer
//! only once every step has succeeded. A failed composition leaves nothing
//! behind.

mod base;
pub mod manifest;
pub mod packages;
pub mod supervisor;

pub use base::unpack_base;
pub use manifest::LayerManifest;
pub use packages::{Apk, PackageManager, RuntimePin};

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{cleanup_work_dir, clear_dir, prepare_work_dir};
use crate::config::{BaseDistro, Config};
use crate::error::CompositionError;
use crate::identity;
use crate::layout;
use crate::timing::Timer;

pub const STAGING_NAME: &str = "layer.staging";
pub const LAYER_NAME: &str = "layer";
pub const MANIFEST_NAME: &str = "layer.json";
pub const OLD_LAYER_NAME: &str = "layer.old";
pub const OLD_MANIFEST_NAME: &str = "layer.json.old";

/// A successfully composed layer.
#[derive(Debug, Clone)]
pub struct ComposedLayer {
    pub path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: LayerManifest,
}

/// Builder for the composed image layer.
pub struct ImageComposer<P: PackageManager> {
    base_distro: BaseDistro,
    base_rootfs: PathBuf,
    runtime: RuntimePin,
    supervisor_binary: PathBuf,
    output_dir: PathBuf,
    packages: P,
}

impl<P: PackageManager> ImageComposer<P> {
    pub fn new(config: &Config, packages: P) -> Self {
        Self {
            base_distro: config.base_distro.clone(),
            base_rootfs: config.base_rootfs.clone(),
            runtime: config.runtime.clone(),
            supervisor_binary: config.supervisor_binary.clone(),
            output_dir: config.output_dir.clone(),
            packages,
        }
    }

    /// Compose the layer. All-or-nothing.
    pub fn compose(&self) -> Result<ComposedLayer, CompositionError> {
        let timer = Timer::start("Composing image layer");
        tracing::info!(
            base = %self.base_distro,
            runtime = %self.runtime,
            output = %self.output_dir.display(),
            "composing"
        );

        if !self.runtime.is_validated_for(&self.base_distro) {
            tracing::warn!(
                "{} is not a validated runtime for {}",
                self.runtime.package,
                self.base_distro
            );
        }

        fs::create_dir_all(&self.output_dir)?;
        let staging = prepare_work_dir(&self.output_dir, STAGING_NAME)?;

        let result = self
            .build_layer(&staging)
            .and_then(|digest| self.publish(&staging, digest));

        if result.is_err() {
            tracing::error!("composition failed, discarding staging directory");
            cleanup_work_dir(&staging);
        }
        let layer = result?;

        timer.finish();
        tracing::info!(layer = %layer.path.display(), "layer composed");
        Ok(layer)
    }

    /// Run every composition step inside `staging`, returning the supervisor
    /// fingerprint.
    fn build_layer(&self, staging: &Path) -> Result<String, CompositionError> {
        unpack_base(&self.base_rootfs, staging)?;
        fs::create_dir_all(staging.join("etc"))?;

        // Group before user.
        identity::create_group(staging)?;
        identity::create_user(staging)?;

        let digest = supervisor::place(&self.supervisor_binary, staging)?;

        tracing::info!(manager = self.packages.name(), "refreshing package index");
        self.packages.refresh_index(staging)?;
        tracing::info!(package = %self.runtime, "installing runtime");
        self.packages.install(staging, &self.runtime)?;

        identity::check_exclusive(staging)?;
        supervisor::check_unchanged(staging, &digest)?;

        self.remove_residue(staging)?;
        Ok(digest)
    }

    /// Drop package caches and anything under the pseudo-filesystem mount
    /// points.
    fn remove_residue(&self, staging: &Path) -> Result<(), CompositionError> {
        let residue = self
            .packages
            .cache_dirs()
            .iter()
            .copied()
            .chain(layout::mount_points().filter(|d| *d != "var"));

        for dir in residue {
            let path = staging.join(dir);
            if path.is_dir() && !path.is_symlink() {
                let removed = clear_dir(&path)?;
                if removed > 0 {
                    tracing::debug!(dir, removed, "removed build residue");
                }
            }
        }
        Ok(())
    }

    /// Replace any previous layer with `staging` and write the manifest.
    ///
    /// The previous layer and manifest are moved aside first and only
    /// removed once the new pair is in place; on failure they are restored.
    fn publish(&self, staging: &Path, digest: String) -> Result<ComposedLayer, CompositionError> {
        let layer = self.output_dir.join(LAYER_NAME);
        let manifest_path = self.output_dir.join(MANIFEST_NAME);
        let old_layer = self.output_dir.join(OLD_LAYER_NAME);
        let old_manifest = self.output_dir.join(OLD_MANIFEST_NAME);

        let manifest = LayerManifest::new(
            self.base_distro.clone(),
            self.packages.name(),
            self.runtime.clone(),
            digest,
            manifest::top_level_names(staging)?,
        );

        cleanup_work_dir(&old_layer);
        if old_manifest.exists() {
            fs::remove_file(&old_manifest)?;
        }
        let had_layer = layer.exists();
        let had_manifest = manifest_path.exists();
        if had_layer {
            fs::rename(&layer, &old_layer)?;
        }
        if had_manifest {
            if let Err(e) = fs::rename(&manifest_path, &old_manifest) {
                restore(&old_layer, &layer, had_layer);
                return Err(e.into());
            }
        }

        let installed = fs::rename(staging, &layer).and_then(|()| {
            manifest.write(&manifest_path).map_err(|e| {
                // A layer without a manifest is not a finished layer.
                cleanup_work_dir(&layer);
                e
            })
        });
        if let Err(e) = installed {
            restore(&old_layer, &layer, had_layer);
            restore(&old_manifest, &manifest_path, had_manifest);
            return Err(e.into());
        }

        cleanup_work_dir(&old_layer);
        if had_manifest {
            if let Err(e) = fs::remove_file(&old_manifest) {
                tracing::warn!(path = %old_manifest.display(), error = %e, "failed to remove previous manifest");
            }
        }

        Ok(ComposedLayer {
            path: layer,
            manifest_path,
            manifest,
        })
    }
}

/// Move a set-aside output back into place.
fn restore(aside: &Path, path: &Path, existed: bool) {
    if !existed {
        return;
    }
    if let Err(e) = fs::rename(aside, path) {
        tracing::error!(
            path = %path.display(),
            aside = %aside.display(),
            error = %e,
            "failed to restore previous output"
        );
    }
}
