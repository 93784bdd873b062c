//! Composed layer manifest.
//!
//! Written last, after the layer directory is in place, so a manifest only
//! ever describes a complete layer. Carries no timestamps: identical inputs
//! give an identical manifest.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::BaseDistro;
use crate::identity;

use super::packages::RuntimePin;
use super::supervisor::SUPERVISOR_PATH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub shell: String,
    pub home: String,
}

impl IdentityRecord {
    pub fn untrusted() -> Self {
        Self {
            name: identity::UNTRUSTED_NAME.to_string(),
            uid: identity::UNTRUSTED_UID,
            gid: identity::UNTRUSTED_GID,
            shell: identity::UNTRUSTED_SHELL.to_string(),
            home: identity::UNTRUSTED_HOME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorRecord {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerManifest {
    pub base: BaseDistro,
    pub package_manager: String,
    pub runtime: RuntimePin,
    pub identity: IdentityRecord,
    pub supervisor: SupervisorRecord,
    /// Top-level entries of the layer, sorted.
    pub top_level: Vec<String>,
}

impl LayerManifest {
    pub fn new(
        base: BaseDistro,
        package_manager: &str,
        runtime: RuntimePin,
        supervisor_sha256: String,
        top_level: Vec<String>,
    ) -> Self {
        Self {
            base,
            package_manager: package_manager.to_string(),
            runtime,
            identity: IdentityRecord::untrusted(),
            supervisor: SupervisorRecord {
                path: SUPERVISOR_PATH.to_string(),
                sha256: supervisor_sha256,
            },
            top_level,
        }
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Corrupted manifest {}", path.display()))
    }

    pub fn print(&self) {
        println!("Composed layer:");
        println!("  Base: {}", self.base);
        println!("  Runtime: {} (via {})", self.runtime, self.package_manager);
        println!(
            "  Identity: {} uid={} gid={} shell={} home={}",
            self.identity.name,
            self.identity.uid,
            self.identity.gid,
            self.identity.shell,
            self.identity.home
        );
        println!("  Supervisor: {} sha256={}", self.supervisor.path, self.supervisor.sha256);
        println!("  Top level: {}", self.top_level.join(" "));
    }
}

/// Sorted names of the top-level entries under `root`.
pub fn top_level_names(root: &Path) -> std::io::Result<Vec<String>> {
    let mut names = fs::read_dir(root)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}
