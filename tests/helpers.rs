//! Shared test utilities for pyro-rootfs tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use pyro_rootfs::compose::{PackageManager, RuntimePin};
use pyro_rootfs::config::Config;
use pyro_rootfs::error::CompositionError;

/// Path the fake JDK install drops its compiler at.
pub const JAVAC: &str = "usr/lib/jvm/java-17-openjdk/bin/javac";

/// Test environment: a mock base root, a supervisor artifact and an output
/// directory, all under one temporary directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub base_dir: PathBuf,
    pub base_rootfs: PathBuf,
    pub supervisor: PathBuf,
    pub output: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();

        let base_rootfs = base_dir.join("alpine-minirootfs");
        create_mock_base(&base_rootfs);

        let supervisor = base_dir.join("pyrod");
        create_executable(&supervisor, &static_elf());

        Self {
            _temp_dir: temp_dir,
            output: base_dir.join("output"),
            base_dir,
            base_rootfs,
            supervisor,
        }
    }

    /// Configuration pointing at this environment.
    pub fn config(&self) -> Config {
        let base_rootfs = self.base_rootfs.display().to_string();
        let supervisor = self.supervisor.display().to_string();
        let output = self.output.display().to_string();
        Config::from_lookup(&self.base_dir, |key| match key {
            "PYRO_BASE_ROOTFS" => Some(base_rootfs.clone()),
            "PYRO_SUPERVISOR_BINARY" => Some(supervisor.clone()),
            "PYRO_OUTPUT_DIR" => Some(output.clone()),
            _ => None,
        })
        .expect("Failed to build config")
    }

    /// A fresh, empty export destination.
    pub fn destination(&self, name: &str) -> PathBuf {
        let dest = self.base_dir.join(name);
        fs::create_dir_all(&dest).expect("Failed to create destination");
        dest
    }
}

/// Create a minimal Alpine-like base root.
pub fn create_mock_base(root: &Path) {
    let dirs = [
        "bin",
        "sbin",
        "etc/apk",
        "lib/apk/db",
        "root",
        "usr/bin",
        "usr/lib",
        "usr/sbin",
        "dev",
        "proc",
        "run",
        "sys",
        "var/cache/apk",
        "var/log",
        "home",
        "tmp",
    ];
    for dir in dirs {
        fs::create_dir_all(root.join(dir)).expect("Failed to create mock base dir");
    }

    fs::write(
        root.join("etc/passwd"),
        "root:x:0:0:root:/root:/bin/ash\n\
         daemon:x:2:2:daemon:/sbin:/sbin/nologin\n\
         nobody:x:65534:65534:nobody:/:/sbin/nologin\n",
    )
    .expect("Failed to create passwd");
    fs::write(
        root.join("etc/group"),
        "root:x:0:root\ndaemon:x:2:root,daemon\nwheel:x:10:root\nnogroup:x:65533:\n",
    )
    .expect("Failed to create group");
    fs::write(
        root.join("etc/shadow"),
        "root:*::0:::::\ndaemon:!::0:::::\nnobody:!::0:::::\n",
    )
    .expect("Failed to create shadow");
    fs::write(root.join("etc/alpine-release"), "3.18.4\n").expect("Failed to create release");

    create_executable(&root.join("bin/busybox"), b"busybox");
    std::os::unix::fs::symlink("/bin/busybox", root.join("bin/sh"))
        .expect("Failed to create symlink");
    fs::write(root.join("lib/apk/db/installed"), "P:busybox\n").expect("Failed to create db");
    fs::write(root.join("var/cache/apk/APKINDEX.tar.gz"), b"index")
        .expect("Failed to create cache file");
}

/// Write `content` to `path` with mode 0755.
pub fn create_executable(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for binary");
    }
    fs::write(path, content).expect("Failed to create binary");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("Failed to set permissions");
}

fn elf_header(e_type: u16, phnum: u16) -> Vec<u8> {
    let mut out = vec![0u8; 64];
    out[..4].copy_from_slice(b"\x7fELF");
    out[4] = 2; // ELFCLASS64
    out[5] = 1; // little endian
    out[6] = 1;
    out[16..18].copy_from_slice(&e_type.to_le_bytes());
    out[18..20].copy_from_slice(&62u16.to_le_bytes()); // x86_64
    out[32..40].copy_from_slice(&64u64.to_le_bytes());
    out[52..54].copy_from_slice(&64u16.to_le_bytes());
    out[54..56].copy_from_slice(&56u16.to_le_bytes());
    out[56..58].copy_from_slice(&phnum.to_le_bytes());
    out
}

fn phdr(p_type: u32, offset: u64, size: u64) -> Vec<u8> {
    let mut h = vec![0u8; 56];
    h[0..4].copy_from_slice(&p_type.to_le_bytes());
    h[8..16].copy_from_slice(&offset.to_le_bytes());
    h[32..40].copy_from_slice(&size.to_le_bytes());
    h
}

/// A statically linked ELF executable with a single PT_LOAD segment.
pub fn static_elf() -> Vec<u8> {
    let mut out = elf_header(2, 1);
    out.extend(phdr(1, 120, 16));
    out.extend([0x90u8; 16]);
    out
}

/// A dynamically linked ELF executable requesting a program interpreter.
pub fn dynamic_elf() -> Vec<u8> {
    let interp = b"/lib/ld-musl-x86_64.so.1\0";
    let mut out = elf_header(2, 1);
    out.extend(phdr(3, 120, interp.len() as u64));
    out.extend(interp);
    out
}

/// Package manager double that installs a fake JDK into the target root.
pub struct FakePackages {
    /// Service account line appended to passwd on install.
    pub add_account: Option<String>,
    pub refreshed: Cell<bool>,
}

impl FakePackages {
    pub fn new() -> Self {
        Self {
            add_account: None,
            refreshed: Cell::new(false),
        }
    }

    pub fn with_account(line: &str) -> Self {
        Self {
            add_account: Some(line.to_string()),
            ..Self::new()
        }
    }
}

impl PackageManager for FakePackages {
    fn name(&self) -> &str {
        "fake-apk"
    }

    fn refresh_index(&self, root: &Path) -> Result<(), CompositionError> {
        fs::create_dir_all(root.join("var/cache/apk"))?;
        fs::write(root.join("var/cache/apk/APKINDEX.fresh.tar.gz"), b"index")?;
        self.refreshed.set(true);
        Ok(())
    }

    fn install(&self, root: &Path, pin: &RuntimePin) -> Result<(), CompositionError> {
        if !self.refreshed.get() {
            return Err(CompositionError::PackageIndex {
                manager: self.name().to_string(),
                reason: "index not refreshed".to_string(),
            });
        }
        if pin.package != "openjdk17" {
            return Err(CompositionError::PackageInstall {
                manager: self.name().to_string(),
                package: pin.to_string(),
                reason: format!("unable to select packages: {} (no such package)", pin),
            });
        }

        create_executable(&root.join(JAVAC), b"javac");
        fs::write(root.join("var/cache/apk/openjdk17.apk"), b"package")?;
        if let Some(line) = &self.add_account {
            let passwd = root.join("etc/passwd");
            let mut content = fs::read_to_string(&passwd)?;
            content.push_str(line);
            content.push('\n');
            fs::write(&passwd, content)?;
        }
        Ok(())
    }

    fn cache_dirs(&self) -> &[&'static str] {
        &["var/cache/apk"]
    }
}

/// Names of the entries directly under `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to read dir")
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("Failed to read file: {}", path.display()));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}

/// Assert that a directory exists and is empty.
pub fn assert_empty_dir(path: &Path) {
    assert!(path.is_dir(), "Expected directory to exist: {}", path.display());
    assert!(
        entries(path).is_empty(),
        "Expected {} to be empty, found {:?}",
        path.display(),
        entries(path)
    );
}
