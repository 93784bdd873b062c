//! Configuration management for pyro-rootfs.
//!
//! Values come from the environment (after `.env` is loaded by `main`), with
//! defaults for everything. CLI flags override individual fields afterwards.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::compose::{
    RuntimePin, LAYER_NAME, MANIFEST_NAME, OLD_LAYER_NAME, OLD_MANIFEST_NAME, STAGING_NAME,
};

pub const DEFAULT_BASE_DISTRO: &str = "alpine:3.18";
pub const DEFAULT_BASE_ROOTFS: &str = "downloads/alpine-minirootfs";
pub const DEFAULT_RUNTIME_PACKAGE: &str = "openjdk17";
pub const DEFAULT_SUPERVISOR_BINARY: &str = "target/x86_64-unknown-linux-musl/release/pyrod";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Base distribution identifier, e.g. `alpine:3.18`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseDistro {
    pub name: String,
    pub release: String,
}

impl FromStr for BaseDistro {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((name, release)) if !name.is_empty() && !release.is_empty() => Ok(Self {
                name: name.to_string(),
                release: release.to_string(),
            }),
            _ => bail!("Invalid base distribution '{}', expected NAME:RELEASE", s),
        }
    }
}

impl fmt::Display for BaseDistro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.release)
    }
}

/// pyro-rootfs configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base distribution the layer is built from
    pub base_distro: BaseDistro,
    /// Extracted base root directory or minirootfs tarball
    pub base_rootfs: PathBuf,
    /// Language runtime package
    pub runtime: RuntimePin,
    /// Statically linked supervisor artifact
    pub supervisor_binary: PathBuf,
    /// Where the composed layer and its manifest are written
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load(base_dir: &Path) -> Result<Self> {
        Self::from_lookup(base_dir, |key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(base_dir: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| {
            let path = PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()));
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let base_distro = lookup("PYRO_BASE_DISTRO")
            .unwrap_or_else(|| DEFAULT_BASE_DISTRO.to_string())
            .parse()?;

        let runtime = RuntimePin {
            package: lookup("PYRO_RUNTIME_PACKAGE")
                .unwrap_or_else(|| DEFAULT_RUNTIME_PACKAGE.to_string()),
            version: lookup("PYRO_RUNTIME_VERSION").filter(|v| !v.is_empty()),
        };

        Ok(Self {
            base_distro,
            base_rootfs: path("PYRO_BASE_ROOTFS", DEFAULT_BASE_ROOTFS),
            runtime,
            supervisor_binary: path("PYRO_SUPERVISOR_BINARY", DEFAULT_SUPERVISOR_BINARY),
            output_dir: path("PYRO_OUTPUT_DIR", DEFAULT_OUTPUT_DIR),
        })
    }

    /// Directory holding the composed layer.
    pub fn layer_dir(&self) -> PathBuf {
        self.output_dir.join(LAYER_NAME)
    }

    /// Manifest describing the composed layer.
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_NAME)
    }

    /// Leftover staging directory of an interrupted composition.
    pub fn staging_dir(&self) -> PathBuf {
        self.output_dir.join(STAGING_NAME)
    }

    /// Previous layer and manifest, set aside while a new layer is published.
    pub fn set_aside_paths(&self) -> [PathBuf; 2] {
        [
            self.output_dir.join(OLD_LAYER_NAME),
            self.output_dir.join(OLD_MANIFEST_NAME),
        ]
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  PYRO_BASE_DISTRO: {}", self.base_distro);
        println!("  PYRO_BASE_ROOTFS: {}", self.base_rootfs.display());
        println!("  PYRO_RUNTIME_PACKAGE: {}", self.runtime.package);
        println!(
            "  PYRO_RUNTIME_VERSION: {}",
            self.runtime.version.as_deref().unwrap_or("(distribution default)")
        );
        println!("  PYRO_SUPERVISOR_BINARY: {}", self.supervisor_binary.display());
        println!("  PYRO_OUTPUT_DIR: {}", self.output_dir.display());
        if self.layer_dir().is_dir() {
            println!("  Composed layer: FOUND");
        } else {
            println!("  Composed layer: NOT FOUND (run 'pyro-rootfs compose')");
        }
    }
}
