//! Runtime installation through the base distribution's package manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::BaseDistro;
use crate::error::CompositionError;
use crate::process::{self, Cmd};

/// Runtime packages validated against a base distribution release.
///
/// Alpine 3.18 ships openjdk17 as its newest JDK.
pub const VALIDATED_RUNTIMES: &[(&str, &str, &str)] = &[("alpine", "3.18", "openjdk17")];

/// A runtime package with an optional exact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePin {
    pub package: String,
    pub version: Option<String>,
}

impl RuntimePin {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: None,
        }
    }

    /// Whether this package is known to work on `distro`.
    pub fn is_validated_for(&self, distro: &BaseDistro) -> bool {
        VALIDATED_RUNTIMES.iter().any(|(name, release, package)| {
            *name == distro.name && *release == distro.release && *package == self.package
        })
    }
}

impl fmt::Display for RuntimePin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}={}", self.package, version),
            None => write!(f, "{}", self.package),
        }
    }
}

/// Package manager operating on a root directory other than `/`.
pub trait PackageManager {
    /// Name for logs and errors.
    fn name(&self) -> &str;

    /// Refresh package index metadata for `root`.
    fn refresh_index(&self, root: &Path) -> Result<(), CompositionError>;

    /// Install `pin` into `root`.
    fn install(&self, root: &Path, pin: &RuntimePin) -> Result<(), CompositionError>;

    /// Cache directories (relative to the root) emptied after installation.
    fn cache_dirs(&self) -> &[&'static str];
}

/// Alpine's `apk`, driven with `--root`.
#[derive(Debug, Clone)]
pub struct Apk {
    program: PathBuf,
}

impl Apk {
    /// Download cache, and the cache link some Alpine releases keep under `etc`.
    pub const CACHE_DIRS: &'static [&'static str] = &["var/cache/apk", "etc/apk/cache"];

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find `apk`, or `apk.static` on non-Alpine hosts.
    pub fn locate() -> Option<Self> {
        process::which("apk")
            .or_else(|| process::which("apk.static"))
            .map(Self::new)
    }

    fn cmd(&self, root: &Path) -> Cmd {
        Cmd::new(self.program.as_os_str())
            .arg("--root")
            .arg_path(root)
            .arg("--no-progress")
    }
}

impl PackageManager for Apk {
    fn name(&self) -> &str {
        "apk"
    }

    fn refresh_index(&self, root: &Path) -> Result<(), CompositionError> {
        self.cmd(root)
            .arg("update")
            .error_msg("apk update failed")
            .run()
            .map_err(|e| CompositionError::PackageIndex {
                manager: self.name().to_string(),
                reason: format!("{:#}", e),
            })?;
        Ok(())
    }

    fn install(&self, root: &Path, pin: &RuntimePin) -> Result<(), CompositionError> {
        self.cmd(root)
            .arg("add")
            .arg(pin.to_string())
            .error_msg(format!("apk add {} failed", pin))
            .run()
            .map_err(|e| CompositionError::PackageInstall {
                manager: self.name().to_string(),
                package: pin.to_string(),
                reason: format!("{:#}", e),
            })?;
        Ok(())
    }

    fn cache_dirs(&self) -> &[&'static str] {
        Self::CACHE_DIRS
    }
}
