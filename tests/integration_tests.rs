//! Integration tests for pyro-rootfs.
//!
//! Drive the composer, exporter and verifier against a mock Alpine base and a
//! fake package manager. No network, no real apk.

mod helpers;

use helpers::{
    assert_empty_dir, assert_file_contains, create_executable, dynamic_elf, entries,
    FakePackages, TestEnv, JAVAC,
};
use pyro_rootfs::compose::{ImageComposer, LayerManifest, PackageManager, RuntimePin};
use pyro_rootfs::error::{CompositionError, ExportError};
use pyro_rootfs::export::RootfsExporter;
use pyro_rootfs::layout::{self, ROOTFS_LAYOUT};
use pyro_rootfs::verify::verify_rootfs;
use std::fs;
use std::os::unix::fs::PermissionsExt;

fn canonical_top_level() -> Vec<String> {
    let mut names: Vec<String> = ROOTFS_LAYOUT.iter().map(|e| e.name.to_string()).collect();
    names.sort();
    names
}

// =============================================================================
// Full pipeline
// =============================================================================

#[test]
fn test_compose_export_verify() {
    let env = TestEnv::new();
    let config = env.config();

    let layer = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap();
    assert_eq!(layer.path, config.layer_dir());
    assert!(config.manifest_path().is_file());
    assert!(!config.staging_dir().exists());

    let dest = env.destination("rootfs");
    let report = RootfsExporter::new(&layer.path, &dest).export().unwrap();
    assert_eq!(report.skipped, ["home", "tmp"]);

    assert_eq!(entries(&dest), canonical_top_level());
    for name in layout::mount_points() {
        assert_empty_dir(&dest.join(name));
    }
    let mode = |name: &str| fs::metadata(dest.join(name)).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode("proc"), 0o555);
    assert_eq!(mode("sys"), 0o555);
    assert_eq!(mode("run"), 0o755);

    assert!(dest.join(JAVAC).is_file());
    assert_eq!(fs::read_link(dest.join("bin/sh")).unwrap().to_str(), Some("/bin/busybox"));
    assert_file_contains(
        &dest.join("etc/passwd"),
        "untrusted:x:111:111:untrusted:/nonexistent:/bin/false",
    );
    assert_file_contains(&dest.join("etc/group"), "untrusted:x:111:untrusted");
    assert_file_contains(&dest.join("etc/shadow"), "untrusted:!:");
    assert!(!dest.join("nonexistent").exists());

    let pyrod = dest.join("bin/pyrod");
    assert_eq!(fs::read(&pyrod).unwrap(), fs::read(&env.supervisor).unwrap());
    assert_eq!(fs::metadata(&pyrod).unwrap().permissions().mode() & 0o7777, 0o755);

    let verification = verify_rootfs(&dest, FakePackages::new().cache_dirs()).unwrap();
    assert!(verification.passed(), "{:?}", verification.failures);
}

#[test]
fn test_layer_has_no_build_residue() {
    let env = TestEnv::new();
    let layer = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap();

    assert_empty_dir(&layer.path.join("var/cache/apk"));
    for name in ["dev", "proc", "run", "sys"] {
        assert_empty_dir(&layer.path.join(name));
    }
    assert!(layer.path.join("var/log").is_dir());
}

#[test]
fn test_composition_is_deterministic() {
    let env = TestEnv::new();
    let config = env.config();

    let first = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap();
    let first_passwd = fs::read_to_string(first.path.join("etc/passwd")).unwrap();
    let first_group = fs::read_to_string(first.path.join("etc/group")).unwrap();
    let first_manifest = fs::read(&first.manifest_path).unwrap();

    let second = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap();

    assert_eq!(first.manifest, second.manifest);
    assert_eq!(fs::read(&second.manifest_path).unwrap(), first_manifest);
    assert_eq!(
        fs::read_to_string(second.path.join("etc/passwd")).unwrap(),
        first_passwd
    );
    assert_eq!(
        fs::read_to_string(second.path.join("etc/group")).unwrap(),
        first_group
    );
    assert_eq!(entries(&second.path), second.manifest.top_level);
}

#[test]
fn test_manifest_round_trips_from_disk() {
    let env = TestEnv::new();
    let layer = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap();

    let read = LayerManifest::read(&layer.manifest_path).unwrap();
    assert_eq!(read, layer.manifest);
    assert_eq!(read.supervisor.path, "/bin/pyrod");
    assert_eq!(read.identity.uid, 111);
    assert_eq!(read.runtime, RuntimePin::new("openjdk17"));
}

// =============================================================================
// Composition failures
// =============================================================================

#[test]
fn test_unknown_runtime_package_leaves_nothing() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.runtime = RuntimePin::new("openjdk99");

    let err = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap_err();

    assert!(
        matches!(err, CompositionError::PackageInstall { ref package, .. } if package == "openjdk99"),
        "unexpected error: {}",
        err
    );
    assert!(!config.layer_dir().exists());
    assert!(!config.manifest_path().exists());
    assert!(!config.staging_dir().exists());
}

#[test]
fn test_failed_compose_keeps_previous_layer() {
    let env = TestEnv::new();
    let mut config = env.config();
    let previous = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap();
    let manifest = fs::read(&previous.manifest_path).unwrap();

    config.runtime = RuntimePin::new("does-not-exist");
    ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap_err();

    assert!(previous.path.join(JAVAC).is_file());
    assert_eq!(fs::read(&previous.manifest_path).unwrap(), manifest);
    assert!(!config.staging_dir().exists());
}

#[test]
fn test_dynamic_supervisor_rejected() {
    let env = TestEnv::new();
    create_executable(&env.supervisor, &dynamic_elf());
    let config = env.config();

    let err = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap_err();

    assert!(matches!(err, CompositionError::DynamicSupervisor { .. }), "{}", err);
    assert!(!config.layer_dir().exists());
}

#[test]
fn test_missing_supervisor_rejected() {
    let env = TestEnv::new();
    fs::remove_file(&env.supervisor).unwrap();

    let err = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap_err();
    assert!(matches!(err, CompositionError::MissingSupervisor(_)), "{}", err);
}

#[test]
fn test_runtime_service_account_collision() {
    let env = TestEnv::new();
    let config = env.config();
    let packages = FakePackages::with_account("jvmd:x:111:200:jvm daemon:/:/sbin/nologin");

    let err = ImageComposer::new(&config, packages).compose().unwrap_err();

    assert!(matches!(err, CompositionError::IdCollision(_)), "{}", err);
    assert!(!config.layer_dir().exists());
}

#[test]
fn test_base_gid_collision() {
    let env = TestEnv::new();
    let group = env.base_rootfs.join("etc/group");
    let mut content = fs::read_to_string(&group).unwrap();
    content.push_str("ntp:x:111:\n");
    fs::write(&group, content).unwrap();

    let err = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap_err();
    assert!(matches!(err, CompositionError::IdCollision(_)), "{}", err);
}

#[test]
fn test_base_shadow_password_rejected() {
    let env = TestEnv::new();
    let shadow = env.base_rootfs.join("etc/shadow");
    let mut content = fs::read_to_string(&shadow).unwrap();
    content.push_str("untrusted:$6$salt$hash:19000:0:99999:7:::\n");
    fs::write(&shadow, content).unwrap();

    let config = env.config();
    let err = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap_err();

    assert!(matches!(err, CompositionError::IdCollision(_)), "{}", err);
    assert!(err.to_string().contains("usable password"), "{}", err);
    assert!(!config.layer_dir().exists());
}

#[test]
fn test_base_supplementary_group_rejected() {
    let env = TestEnv::new();
    let group = env.base_rootfs.join("etc/group");
    let content = fs::read_to_string(&group)
        .unwrap()
        .replace("wheel:x:10:root", "wheel:x:10:root,untrusted");
    fs::write(&group, content).unwrap();

    let config = env.config();
    let err = ImageComposer::new(&config, FakePackages::new())
        .compose()
        .unwrap_err();

    assert!(matches!(err, CompositionError::IdCollision(_)), "{}", err);
    assert!(err.to_string().contains("wheel"), "{}", err);
    assert!(!config.layer_dir().exists());
}

#[test]
fn test_missing_base_root() {
    let env = TestEnv::new();
    fs::remove_dir_all(&env.base_rootfs).unwrap();

    let err = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap_err();
    assert!(matches!(err, CompositionError::BaseMissing(_)), "{}", err);
}

// =============================================================================
// Export failures
// =============================================================================

#[test]
fn test_stray_file_in_destination() {
    let env = TestEnv::new();
    let layer = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap();
    let dest = env.destination("rootfs");
    fs::write(dest.join("stray"), "left over").unwrap();

    let err = RootfsExporter::new(&layer.path, &dest).export().unwrap_err();

    assert!(
        matches!(err, ExportError::DestinationNotEmpty { ref entry, .. } if entry == "stray"),
        "{}",
        err
    );
    assert_eq!(entries(&dest), ["stray"]);
}

#[test]
fn test_export_is_fail_fast() {
    let env = TestEnv::new();
    let layer = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap();
    fs::remove_dir_all(layer.path.join("sbin")).unwrap();
    let dest = env.destination("rootfs");

    let err = RootfsExporter::new(&layer.path, &dest).export().unwrap_err();

    assert!(matches!(err, ExportError::SourceMissing(ref name) if name == "sbin"), "{}", err);
    assert_eq!(entries(&dest), ["bin", "etc", "lib", "root"]);
    assert!(!dest.join("usr").exists());
    assert!(!dest.join("dev").exists());
}

// =============================================================================
// Verification
// =============================================================================

#[test]
fn test_verify_reports_every_violation() {
    let env = TestEnv::new();
    let layer = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap();
    let dest = env.destination("rootfs");
    RootfsExporter::new(&layer.path, &dest).export().unwrap();

    fs::write(dest.join("run/utmp"), "").unwrap();
    fs::create_dir(dest.join("home")).unwrap();
    fs::create_dir(dest.join("nonexistent")).unwrap();
    create_executable(&dest.join("usr/bin/pyrod"), b"second copy");
    fs::set_permissions(dest.join("bin/pyrod"), fs::Permissions::from_mode(0o644)).unwrap();

    let verification = verify_rootfs(&dest, FakePackages::new().cache_dirs()).unwrap();

    assert!(!verification.passed());
    let failures = verification.failures.join("\n");
    for expected in [
        "/run must be empty",
        "unexpected top-level entry /home",
        "unexpected top-level entry /nonexistent",
        "home directory /nonexistent exists",
        "extra supervisor copy at /usr/bin/pyrod",
        "/bin/pyrod is not executable",
    ] {
        assert!(failures.contains(expected), "missing '{}' in:\n{}", expected, failures);
    }
}

#[test]
fn test_verify_tolerates_lost_found() {
    let env = TestEnv::new();
    let layer = ImageComposer::new(&env.config(), FakePackages::new())
        .compose()
        .unwrap();
    let dest = env.destination("rootfs");
    fs::create_dir(dest.join("lost+found")).unwrap();
    RootfsExporter::new(&layer.path, &dest).export().unwrap();

    let verification = verify_rootfs(&dest, FakePackages::new().cache_dirs()).unwrap();
    assert!(verification.passed(), "{:?}", verification.failures);
}
