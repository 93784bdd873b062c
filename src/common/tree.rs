//! Structural directory tree copy.
//!
//! Recreates every entry by type instead of streaming bytes, so the copy keeps
//! ownership, mode bits (setuid/setgid/sticky included), symlinks, hard links,
//! device nodes, FIFOs and modification times.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{self, Metadata};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{lchown, symlink, FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::error::ExportError;

/// Counts of what a copy recreated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub dirs: usize,
    pub files: usize,
    pub symlinks: usize,
    pub hardlinks: usize,
    pub special: usize,
}

impl CopyStats {
    pub fn total(&self) -> usize {
        self.dirs + self.files + self.symlinks + self.hardlinks + self.special
    }

    pub fn add(&mut self, other: CopyStats) {
        self.dirs += other.dirs;
        self.files += other.files;
        self.symlinks += other.symlinks;
        self.hardlinks += other.hardlinks;
        self.special += other.special;
    }
}

fn copy_err(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Copy {
        path: path.to_path_buf(),
        source,
    }
}

fn mknod(path: &Path, mode: u32, rdev: u64) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    // SAFETY: c_path is a valid NUL-terminated string for the call's duration.
    let rc = unsafe { libc::mknod(c_path.as_ptr(), mode as libc::mode_t, rdev as libc::dev_t) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Apply owner, then mode (chown clears setuid/setgid), then times.
///
/// Times are set without opening the target: opening a FIFO blocks and
/// opening a device node reaches its driver.
fn apply_metadata(target: &Path, meta: &Metadata) -> io::Result<()> {
    lchown(target, Some(meta.uid()), Some(meta.gid()))?;
    if !meta.file_type().is_symlink() {
        fs::set_permissions(target, fs::Permissions::from_mode(meta.mode() & 0o7777))?;
    }
    filetime::set_symlink_file_times(
        target,
        FileTime::from_last_access_time(meta),
        FileTime::from_last_modification_time(meta),
    )
}

/// Copy `src` to `dst` structurally. `dst` is created if missing.
///
/// Sockets are skipped. Directory metadata is applied after their contents
/// so read-only directories can still be populated.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<CopyStats, ExportError> {
    let mut stats = CopyStats::default();
    let mut inodes: HashMap<(u64, u64), PathBuf> = HashMap::new();
    let mut dirs: Vec<(PathBuf, Metadata)> = Vec::new();

    let walker = WalkDir::new(src)
        .follow_links(false)
        .follow_root_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| ExportError::Copy {
            path: e.path().unwrap_or(src).to_path_buf(),
            source: e.into(),
        })?;
        let source = entry.path();
        let rel = source.strip_prefix(src).unwrap_or(Path::new(""));
        let target = if rel.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(rel)
        };
        let meta = entry.metadata().map_err(|e| ExportError::Copy {
            path: source.to_path_buf(),
            source: e.into(),
        })?;
        let ft = meta.file_type();

        if ft.is_dir() {
            if !target.is_dir() {
                fs::create_dir(&target).map_err(copy_err(&target))?;
            }
            dirs.push((target, meta));
            stats.dirs += 1;
            continue;
        }

        if ft.is_file() && meta.nlink() > 1 {
            if let Some(first) = inodes.get(&(meta.dev(), meta.ino())) {
                fs::hard_link(first, &target).map_err(copy_err(&target))?;
                stats.hardlinks += 1;
                continue;
            }
            inodes.insert((meta.dev(), meta.ino()), target.clone());
        }

        if ft.is_file() {
            fs::copy(source, &target).map_err(copy_err(source))?;
            stats.files += 1;
        } else if ft.is_symlink() {
            let link = fs::read_link(source).map_err(copy_err(source))?;
            symlink(&link, &target).map_err(copy_err(&target))?;
            stats.symlinks += 1;
        } else if ft.is_char_device() || ft.is_block_device() || ft.is_fifo() {
            mknod(&target, meta.mode(), meta.rdev()).map_err(copy_err(&target))?;
            stats.special += 1;
        } else {
            tracing::debug!(path = %source.display(), "skipping socket");
            continue;
        }

        apply_metadata(&target, &meta).map_err(copy_err(&target))?;
    }

    for (dir, meta) in dirs.iter().rev() {
        apply_metadata(dir, meta).map_err(copy_err(dir))?;
    }

    Ok(stats)
}
