//! Unprivileged execution identity.
//!
//! The guest supervisor hard-codes the same uid/gid, so these are constants
//! and never looked up at runtime.

use std::fs;
use std::path::Path;

use crate::error::CompositionError;

/// Name shared by the untrusted user and group.
pub const UNTRUSTED_NAME: &str = "untrusted";
/// Fixed uid of the untrusted user.
pub const UNTRUSTED_UID: u32 = 111;
/// Fixed gid of the untrusted group.
pub const UNTRUSTED_GID: u32 = 111;
/// Non-functional login shell.
pub const UNTRUSTED_SHELL: &str = "/bin/false";
/// Home field of the passwd entry. The path must not exist in the rootfs.
pub const UNTRUSTED_HOME: &str = "/nonexistent";

/// A parsed `/etc/passwd` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: String,
    pub shell: String,
}

/// A parsed `/etc/group` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

/// A parsed `/etc/shadow` line (name and password field only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowEntry {
    pub name: String,
    pub password: String,
}

impl ShadowEntry {
    /// No password can authenticate: `!`-prefixed or `*`.
    pub fn is_locked(&self) -> bool {
        self.password.starts_with('!') || self.password == "*"
    }
}

fn bad_line(path: &Path, line: &str) -> CompositionError {
    CompositionError::IdentityFile {
        path: path.to_path_buf(),
        reason: format!("malformed line '{}'", line),
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, CompositionError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).map_err(|e| CompositionError::IdentityFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn append_line(path: &Path, line: &str) -> Result<(), CompositionError> {
    let mut content = if path.exists() {
        fs::read_to_string(path).map_err(|e| CompositionError::IdentityFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    } else {
        String::new()
    };
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(line);
    content.push('\n');
    fs::write(path, content).map_err(|e| CompositionError::IdentityFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read `etc/passwd` under `root`. A missing file yields no entries.
pub fn read_passwd(root: &Path) -> Result<Vec<PasswdEntry>, CompositionError> {
    let path = root.join("etc/passwd");
    read_lines(&path)?
        .iter()
        .map(|line| {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() != 7 {
                return Err(bad_line(&path, line));
            }
            Ok(PasswdEntry {
                name: parts[0].to_string(),
                uid: parts[2].parse().map_err(|_| bad_line(&path, line))?,
                gid: parts[3].parse().map_err(|_| bad_line(&path, line))?,
                home: parts[5].to_string(),
                shell: parts[6].to_string(),
            })
        })
        .collect()
}

/// Read `etc/group` under `root`. A missing file yields no entries.
pub fn read_group(root: &Path) -> Result<Vec<GroupEntry>, CompositionError> {
    let path = root.join("etc/group");
    read_lines(&path)?
        .iter()
        .map(|line| {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() != 4 {
                return Err(bad_line(&path, line));
            }
            let members = parts[3]
                .split(',')
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            Ok(GroupEntry {
                name: parts[0].to_string(),
                gid: parts[2].parse().map_err(|_| bad_line(&path, line))?,
                members,
            })
        })
        .collect()
}

/// Read `etc/shadow` under `root`. A missing file yields no entries.
pub fn read_shadow(root: &Path) -> Result<Vec<ShadowEntry>, CompositionError> {
    let path = root.join("etc/shadow");
    read_lines(&path)?
        .iter()
        .map(|line| {
            let mut parts = line.split(':');
            match (parts.next(), parts.next()) {
                (Some(name), Some(password)) => Ok(ShadowEntry {
                    name: name.to_string(),
                    password: password.to_string(),
                }),
                _ => Err(bad_line(&path, line)),
            }
        })
        .collect()
}

/// Create the untrusted system group.
///
/// Already present with the fixed gid is accepted. Any other group holding
/// the gid, or the name bound to another gid, is a collision.
pub fn create_group(root: &Path) -> Result<(), CompositionError> {
    let groups = read_group(root)?;

    if let Some(existing) = groups.iter().find(|g| g.name == UNTRUSTED_NAME) {
        if existing.gid == UNTRUSTED_GID {
            tracing::debug!("group {} already present", UNTRUSTED_NAME);
            return Ok(());
        }
        return Err(CompositionError::IdCollision(format!(
            "group '{}' exists with gid {} (expected {})",
            UNTRUSTED_NAME, existing.gid, UNTRUSTED_GID
        )));
    }
    if let Some(holder) = groups.iter().find(|g| g.gid == UNTRUSTED_GID) {
        return Err(CompositionError::IdCollision(format!(
            "gid {} already used by group '{}'",
            UNTRUSTED_GID, holder.name
        )));
    }

    append_line(
        &root.join("etc/group"),
        &format!("{}:x:{}:{}", UNTRUSTED_NAME, UNTRUSTED_GID, UNTRUSTED_NAME),
    )?;
    tracing::info!(gid = UNTRUSTED_GID, "created group {}", UNTRUSTED_NAME);
    Ok(())
}

/// Create the untrusted system user: no password, no home, no login shell.
pub fn create_user(root: &Path) -> Result<(), CompositionError> {
    if !read_group(root)?
        .iter()
        .any(|g| g.name == UNTRUSTED_NAME && g.gid == UNTRUSTED_GID)
    {
        return Err(CompositionError::MissingGroup(UNTRUSTED_NAME.to_string()));
    }

    let users = read_passwd(root)?;
    let present = match users.iter().find(|u| u.name == UNTRUSTED_NAME) {
        Some(existing)
            if existing.uid == UNTRUSTED_UID
                && existing.gid == UNTRUSTED_GID
                && existing.shell == UNTRUSTED_SHELL
                && existing.home == UNTRUSTED_HOME =>
        {
            true
        }
        Some(existing) => {
            return Err(CompositionError::IdCollision(format!(
                "user '{}' exists as {}:{} home {} shell {} (expected {}:{} home {} shell {})",
                UNTRUSTED_NAME,
                existing.uid,
                existing.gid,
                existing.home,
                existing.shell,
                UNTRUSTED_UID,
                UNTRUSTED_GID,
                UNTRUSTED_HOME,
                UNTRUSTED_SHELL
            )));
        }
        None => false,
    };
    if !present {
        if let Some(holder) = users.iter().find(|u| u.uid == UNTRUSTED_UID) {
            return Err(CompositionError::IdCollision(format!(
                "uid {} already used by user '{}'",
                UNTRUSTED_UID, holder.name
            )));
        }
    }

    // An inherited shadow entry must already be locked.
    match read_shadow(root)?.iter().find(|s| s.name == UNTRUSTED_NAME) {
        Some(entry) if !entry.is_locked() => {
            return Err(CompositionError::IdCollision(format!(
                "user '{}' has a usable password in /etc/shadow",
                UNTRUSTED_NAME
            )));
        }
        Some(_) => {}
        // Locked password, empty change date so repeated builds are identical.
        None => append_line(
            &root.join("etc/shadow"),
            &format!("{}:!::0:99999:7:::", UNTRUSTED_NAME),
        )?,
    }

    if present {
        tracing::debug!("user {} already present", UNTRUSTED_NAME);
        return Ok(());
    }

    append_line(
        &root.join("etc/passwd"),
        &format!(
            "{name}:x:{uid}:{gid}:{name}:{home}:{shell}",
            name = UNTRUSTED_NAME,
            uid = UNTRUSTED_UID,
            gid = UNTRUSTED_GID,
            home = UNTRUSTED_HOME,
            shell = UNTRUSTED_SHELL,
        ),
    )?;

    tracing::info!(uid = UNTRUSTED_UID, gid = UNTRUSTED_GID, "created user {}", UNTRUSTED_NAME);
    Ok(())
}

/// Confirm the identity still exclusively owns the fixed ids and belongs to
/// no group but its own.
///
/// Package installs may add service accounts; none may claim uid/gid 111.
pub fn check_exclusive(root: &Path) -> Result<(), CompositionError> {
    for user in read_passwd(root)? {
        if user.name != UNTRUSTED_NAME && user.uid == UNTRUSTED_UID {
            return Err(CompositionError::IdCollision(format!(
                "uid {} also used by user '{}'",
                UNTRUSTED_UID, user.name
            )));
        }
        if user.name != UNTRUSTED_NAME && user.gid == UNTRUSTED_GID {
            return Err(CompositionError::IdCollision(format!(
                "user '{}' has primary gid {}",
                user.name, UNTRUSTED_GID
            )));
        }
    }
    for group in read_group(root)? {
        if group.name == UNTRUSTED_NAME {
            continue;
        }
        if group.gid == UNTRUSTED_GID {
            return Err(CompositionError::IdCollision(format!(
                "gid {} also used by group '{}'",
                UNTRUSTED_GID, group.name
            )));
        }
        if group.members.iter().any(|m| m == UNTRUSTED_NAME) {
            return Err(CompositionError::IdCollision(format!(
                "user '{}' is a member of group '{}'",
                UNTRUSTED_NAME, group.name
            )));
        }
    }
    Ok(())
}
