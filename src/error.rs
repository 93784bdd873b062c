//! Error kinds for the two pipeline phases.
//!
//! Neither kind is recovered locally. Both propagate to the CLI, which exits
//! non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Image composition failed. No layer was produced.
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("base root not found: {0}")]
    BaseMissing(PathBuf),

    #[error("failed to unpack base root {path}: {reason}")]
    BaseUnpack { path: PathBuf, reason: String },

    #[error("id collision: {0}")]
    IdCollision(String),

    #[error("group '{0}' must exist before its user is created")]
    MissingGroup(String),

    #[error("identity file {path}: {reason}")]
    IdentityFile { path: PathBuf, reason: String },

    #[error("supervisor binary not found: {0}")]
    MissingSupervisor(PathBuf),

    #[error("supervisor binary {path} is not statically linked: {reason}")]
    DynamicSupervisor { path: PathBuf, reason: String },

    #[error("supervisor binary {0} was modified after placement")]
    SupervisorModified(PathBuf),

    #[error("{manager}: failed to refresh package index: {reason}")]
    PackageIndex { manager: String, reason: String },

    #[error("{manager}: failed to install '{package}': {reason}")]
    PackageInstall {
        manager: String,
        package: String,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rootfs export failed. The destination is invalid and must be discarded.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("composed layer not found: {0}")]
    LayerMissing(PathBuf),

    #[error("destination is not an existing directory: {0}")]
    DestinationMissing(PathBuf),

    #[error("destination {path} is not empty (found '{entry}')")]
    DestinationNotEmpty { path: PathBuf, entry: String },

    #[error("layer is missing content directory /{0}")]
    SourceMissing(String),

    #[error("failed to copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create mount point {path}: {source}")]
    MountPoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
