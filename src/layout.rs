//! Top-level directory layout of the guest rootfs.
//!
//! Every top-level directory the guest needs is listed exactly once, together
//! with how the exporter treats it. Directories not in this table are never
//! exported.

/// How the exporter populates a top-level directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirPolicy {
    /// Copied in full from the composed layer.
    Copy,
    /// Created empty with the given mode. Populated by the guest at boot.
    Empty { mode: u32 },
}

/// One row of the layout table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: &'static str,
    pub policy: DirPolicy,
}

const fn copy(name: &'static str) -> DirEntry {
    DirEntry {
        name,
        policy: DirPolicy::Copy,
    }
}

const fn empty(name: &'static str, mode: u32) -> DirEntry {
    DirEntry {
        name,
        policy: DirPolicy::Empty { mode },
    }
}

/// Canonical top-level layout, in export order.
pub const ROOTFS_LAYOUT: &[DirEntry] = &[
    copy("bin"),
    copy("etc"),
    copy("lib"),
    copy("root"),
    copy("sbin"),
    copy("usr"),
    // Mount points: devtmpfs, procfs, tmpfs, sysfs, and volatile guest state.
    empty("dev", 0o755),
    empty("proc", 0o555),
    empty("run", 0o755),
    empty("sys", 0o555),
    empty("var", 0o755),
];

/// Entry a freshly formatted ext filesystem carries at its root.
pub const FSCK_LOST_FOUND: &str = "lost+found";

/// Names of directories copied from the layer.
pub fn copied() -> impl Iterator<Item = &'static str> {
    ROOTFS_LAYOUT
        .iter()
        .filter(|e| e.policy == DirPolicy::Copy)
        .map(|e| e.name)
}

/// Names of directories created empty.
pub fn mount_points() -> impl Iterator<Item = &'static str> {
    ROOTFS_LAYOUT
        .iter()
        .filter(|e| matches!(e.policy, DirPolicy::Empty { .. }))
        .map(|e| e.name)
}

/// Look up the policy for a top-level name.
pub fn policy_for(name: &str) -> Option<DirPolicy> {
    ROOTFS_LAYOUT
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.policy)
}
