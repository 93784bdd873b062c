//! Exported rootfs verification.
//!
//! Checks a guest rootfs against the filesystem contract the supervisor
//! relies on. Every violation is collected; one failing check never hides
//! another.

use anyhow::Result;
use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use walkdir::WalkDir;

use crate::compose::supervisor::{supervisor_in, SUPERVISOR_PATH};
use crate::elf;
use crate::identity::{
    self, UNTRUSTED_GID, UNTRUSTED_HOME, UNTRUSTED_NAME, UNTRUSTED_SHELL, UNTRUSTED_UID,
};
use crate::layout::{self, DirPolicy, FSCK_LOST_FOUND, ROOTFS_LAYOUT};

/// Trees searched for stray supervisor copies.
const SEARCH_ROOTS: &[&str] = &["bin", "sbin", "usr"];

/// Outcome of a verification run.
#[derive(Debug, Default)]
pub struct Verification {
    pub checked: usize,
    pub failures: Vec<String>,
}

impl Verification {
    fn check(&mut self, ok: bool, failure: impl FnOnce() -> String) {
        self.checked += 1;
        if !ok {
            self.failures.push(failure());
        }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn print(&self) {
        println!();
        if self.passed() {
            println!("✓ Verified {}/{} checks", self.checked, self.checked);
        } else {
            println!("✗ VERIFICATION FAILED");
            println!("  {}/{} checks failed:", self.failures.len(), self.checked);
            for failure in &self.failures {
                println!("    - {}", failure);
            }
        }
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn check_layout(root: &Path, v: &mut Verification) -> Result<()> {
    let present: BTreeSet<String> = fs::read_dir(root)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;

    for entry in ROOTFS_LAYOUT {
        let path = root.join(entry.name);
        match entry.policy {
            DirPolicy::Copy => v.check(path.is_dir(), || format!("/{} is missing", entry.name)),
            DirPolicy::Empty { .. } => {
                let is_dir = path.is_dir() && !path.is_symlink();
                v.check(is_dir, || format!("/{} mount point is missing", entry.name));
                if is_dir {
                    v.check(is_empty_dir(&path), || {
                        format!("/{} must be empty at build time", entry.name)
                    });
                }
            }
        }
    }

    for name in &present {
        if name == FSCK_LOST_FOUND {
            continue;
        }
        v.check(layout::policy_for(name).is_some(), || {
            format!("unexpected top-level entry /{}", name)
        });
    }
    Ok(())
}

fn check_identity(root: &Path, v: &mut Verification) -> Result<()> {
    let users = identity::read_passwd(root)?;
    let groups = identity::read_group(root)?;
    let shadow = identity::read_shadow(root)?;

    match users.iter().find(|u| u.name == UNTRUSTED_NAME) {
        Some(user) => {
            v.check(user.uid == UNTRUSTED_UID, || {
                format!("{} has uid {} (expected {})", UNTRUSTED_NAME, user.uid, UNTRUSTED_UID)
            });
            v.check(user.gid == UNTRUSTED_GID, || {
                format!("{} has gid {} (expected {})", UNTRUSTED_NAME, user.gid, UNTRUSTED_GID)
            });
            v.check(user.shell == UNTRUSTED_SHELL, || {
                format!("{} has login shell {}", UNTRUSTED_NAME, user.shell)
            });
            v.check(user.home == UNTRUSTED_HOME, || {
                format!("{} has home {}", UNTRUSTED_NAME, user.home)
            });
            let home = root.join(user.home.trim_start_matches('/'));
            v.check(fs::symlink_metadata(&home).is_err(), || {
                format!("home directory {} exists", user.home)
            });
        }
        None => v.check(false, || format!("user {} not in /etc/passwd", UNTRUSTED_NAME)),
    }

    v.check(
        groups
            .iter()
            .any(|g| g.name == UNTRUSTED_NAME && g.gid == UNTRUSTED_GID),
        || format!("group {} with gid {} not in /etc/group", UNTRUSTED_NAME, UNTRUSTED_GID),
    );
    for group in groups.iter().filter(|g| g.name != UNTRUSTED_NAME) {
        v.check(!group.members.iter().any(|m| m == UNTRUSTED_NAME), || {
            format!("{} is a member of group {}", UNTRUSTED_NAME, group.name)
        });
    }

    match shadow.iter().find(|s| s.name == UNTRUSTED_NAME) {
        Some(entry) => v.check(entry.is_locked(), || {
            format!("{} has a usable password", UNTRUSTED_NAME)
        }),
        None => v.check(false, || format!("user {} not in /etc/shadow", UNTRUSTED_NAME)),
    }

    if let Err(e) = identity::check_exclusive(root) {
        v.check(false, || e.to_string());
    }
    Ok(())
}

fn check_supervisor(root: &Path, v: &mut Verification) {
    let path = supervisor_in(root);
    let meta = match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_file() => meta,
        _ => {
            v.check(false, || format!("{} is missing or not a regular file", SUPERVISOR_PATH));
            return;
        }
    };

    v.check(meta.permissions().mode() & 0o111 != 0, || {
        format!("{} is not executable", SUPERVISOR_PATH)
    });
    match elf::file_linkage(&path) {
        Ok(linkage) => v.check(linkage.is_static(), || {
            format!("{} is dynamically linked: {:?}", SUPERVISOR_PATH, linkage)
        }),
        Err(e) => v.check(false, || format!("{}: {}", SUPERVISOR_PATH, e)),
    }

    let walker = SEARCH_ROOTS
        .iter()
        .flat_map(|dir| WalkDir::new(root.join(dir)).follow_links(false))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == "pyrod");
    for entry in walker {
        if entry.path() == path {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        v.check(false, || format!("extra supervisor copy at /{}", rel.display()));
    }
}

fn check_residue(root: &Path, cache_dirs: &[&str], v: &mut Verification) {
    for dir in cache_dirs {
        let path = root.join(dir);
        if path.is_dir() && !path.is_symlink() {
            v.check(is_empty_dir(&path), || format!("package cache /{} is not empty", dir));
        }
    }
}

/// Verify an exported rootfs. `cache_dirs` are the package manager's cache
/// directories, relative to the root.
pub fn verify_rootfs(root: &Path, cache_dirs: &[&str]) -> Result<Verification> {
    let mut v = Verification::default();

    println!("Verifying {}...\n", root.display());

    println!("Checking top-level layout...");
    check_layout(root, &mut v)?;

    println!("Checking untrusted identity...");
    check_identity(root, &mut v)?;

    println!("Checking supervisor binary...");
    check_supervisor(root, &mut v);

    println!("Checking build residue...");
    check_residue(root, cache_dirs, &mut v);

    Ok(v)
}
