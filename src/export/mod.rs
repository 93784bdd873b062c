//! Rootfs exporter.
//!
//! Flattens the composed layer into an empty, externally mounted destination
//! following [`layout::ROOTFS_LAYOUT`]: content directories are copied
//! structurally, mount points are created empty. The first failure aborts;
//! a partially written destination is invalid and must be discarded by the
//! caller.

use std::fs;
use std::os::unix::fs::{lchown, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::common::{copy_tree, CopyStats};
use crate::error::ExportError;
use crate::layout::{self, DirPolicy, FSCK_LOST_FOUND};
use crate::timing::Timer;

/// Summary of a completed export.
#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub copied: Vec<&'static str>,
    pub created: Vec<&'static str>,
    /// Layer top-level entries that are not part of the guest layout.
    pub skipped: Vec<String>,
    pub stats: CopyStats,
}

/// Exports a composed layer into a guest rootfs directory.
pub struct RootfsExporter {
    layer: PathBuf,
    destination: PathBuf,
}

impl RootfsExporter {
    pub fn new(layer: impl AsRef<Path>, destination: impl AsRef<Path>) -> Self {
        Self {
            layer: layer.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
        }
    }

    /// The destination must be an existing, empty directory. A `lost+found`
    /// directory from `mkfs` is tolerated. Nothing is written if this fails.
    fn check_destination(&self) -> Result<(), ExportError> {
        if !self.destination.is_dir() {
            return Err(ExportError::DestinationMissing(self.destination.clone()));
        }
        for entry in fs::read_dir(&self.destination)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == FSCK_LOST_FOUND && entry.file_type()?.is_dir() {
                continue;
            }
            return Err(ExportError::DestinationNotEmpty {
                path: self.destination.clone(),
                entry: name,
            });
        }
        Ok(())
    }

    fn skipped_entries(&self) -> Result<Vec<String>, ExportError> {
        let mut skipped = Vec::new();
        for entry in fs::read_dir(&self.layer)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if layout::policy_for(&name).is_none() {
                skipped.push(name);
            }
        }
        skipped.sort();
        Ok(skipped)
    }

    fn copy_dir(&self, name: &str) -> Result<CopyStats, ExportError> {
        let src = self.layer.join(name);
        // Merged-usr layers have symlinks here; those are copied as links.
        if fs::symlink_metadata(&src).is_err() {
            return Err(ExportError::SourceMissing(name.to_string()));
        }
        copy_tree(&src, &self.destination.join(name))
    }

    fn create_mount_point(&self, name: &str, mode: u32) -> Result<(), ExportError> {
        let path = self.destination.join(name);
        let mount_err = |source| ExportError::MountPoint {
            path: path.clone(),
            source,
        };
        fs::create_dir(&path).map_err(mount_err)?;
        // SAFETY: geteuid has no preconditions.
        if unsafe { libc::geteuid() } == 0 {
            lchown(&path, Some(0), Some(0)).map_err(mount_err)?;
        }
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).map_err(mount_err)?;
        Ok(())
    }

    /// Export the layer. Entries are processed in layout order, fail-fast.
    pub fn export(&self) -> Result<ExportReport, ExportError> {
        let timer = Timer::start("Exporting guest rootfs");
        tracing::info!(
            layer = %self.layer.display(),
            destination = %self.destination.display(),
            "exporting"
        );

        if !self.layer.is_dir() {
            return Err(ExportError::LayerMissing(self.layer.clone()));
        }
        self.check_destination()?;

        let mut report = ExportReport {
            skipped: self.skipped_entries()?,
            ..Default::default()
        };
        for name in &report.skipped {
            tracing::debug!(entry = %name, "not part of the guest layout, skipping");
        }
        self.populate(&mut report)?;

        timer.finish();
        Ok(report)
    }

    /// Walk the layout table in order. Stops at the first failure.
    fn populate(&self, report: &mut ExportReport) -> Result<(), ExportError> {
        for entry in layout::ROOTFS_LAYOUT {
            match entry.policy {
                DirPolicy::Copy => {
                    let stats = self.copy_dir(entry.name)?;
                    tracing::info!(dir = entry.name, entries = stats.total(), "copied");
                    report.stats.add(stats);
                    report.copied.push(entry.name);
                }
                DirPolicy::Empty { mode } => {
                    self.create_mount_point(entry.name, mode)?;
                    tracing::info!(dir = entry.name, "created mount point (mode {:o})", mode);
                    report.created.push(entry.name);
                }
            }
        }
        Ok(())
    }
}
