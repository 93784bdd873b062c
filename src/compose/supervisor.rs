//! Supervisor binary placement.
//!
//! The guest boots with `init=/bin/pyrod`, so the path is fixed. The binary
//! must be statically linked: package installs may replace shared libraries
//! and the supervisor must not depend on any of them.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::elf;
use crate::error::CompositionError;

/// Absolute path of the supervisor inside the guest.
pub const SUPERVISOR_PATH: &str = "/bin/pyrod";
/// Permission bits of the placed supervisor.
pub const SUPERVISOR_MODE: u32 = 0o755;

/// Location of the supervisor under `root`.
pub fn supervisor_in(root: &Path) -> PathBuf {
    root.join(SUPERVISOR_PATH.trim_start_matches('/'))
}

/// Hex SHA-256 of a file.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reject artifacts that are missing or dynamically linked.
pub fn check_artifact(artifact: &Path) -> Result<(), CompositionError> {
    if !artifact.is_file() {
        return Err(CompositionError::MissingSupervisor(artifact.to_path_buf()));
    }
    let dynamic = |reason: String| CompositionError::DynamicSupervisor {
        path: artifact.to_path_buf(),
        reason,
    };
    match elf::file_linkage(artifact) {
        Ok(elf::Linkage::Static) => Ok(()),
        Ok(elf::Linkage::Dynamic { interpreter, needed }) => Err(dynamic(format!(
            "interpreter {}, {} needed libraries",
            interpreter.as_deref().unwrap_or("none"),
            needed
        ))),
        Err(e) => Err(dynamic(e.to_string())),
    }
}

/// Copy the supervisor into `root` and return its fingerprint.
pub fn place(artifact: &Path, root: &Path) -> Result<String, CompositionError> {
    check_artifact(artifact)?;

    let dest = supervisor_in(root);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(artifact, &dest)?;

    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } == 0 {
        std::os::unix::fs::lchown(&dest, Some(0), Some(0))?;
    }
    fs::set_permissions(&dest, fs::Permissions::from_mode(SUPERVISOR_MODE))?;

    let digest = fingerprint(&dest)?;
    tracing::info!(path = SUPERVISOR_PATH, sha256 = %digest, "placed supervisor binary");
    Ok(digest)
}

/// Confirm the placed supervisor still matches `expected`.
pub fn check_unchanged(root: &Path, expected: &str) -> Result<(), CompositionError> {
    let dest = supervisor_in(root);
    match fingerprint(&dest) {
        Ok(digest) if digest == expected => Ok(()),
        Ok(_) => Err(CompositionError::SupervisorModified(dest)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(CompositionError::SupervisorModified(dest))
        }
        Err(e) => Err(e.into()),
    }
}
