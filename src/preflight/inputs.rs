//! Build input checks: base root, supervisor artifact, privileges.

use crate::compose::supervisor;
use crate::config::Config;
use crate::error::CompositionError;

use super::types::CheckResult;

pub fn check_inputs(config: &Config) -> Vec<CheckResult> {
    vec![
        check_base_root(config),
        check_supervisor(config),
        check_privileges(),
    ]
}

fn check_base_root(config: &Config) -> CheckResult {
    let base = &config.base_rootfs;
    if base.is_dir() {
        CheckResult::pass_with("Base root", &base.display().to_string())
    } else if base.is_file() {
        CheckResult::pass_with("Base root", &format!("{} (tarball)", base.display()))
    } else {
        CheckResult::fail(
            "Base root",
            &format!(
                "{} not found. Extract the {} minirootfs there or set PYRO_BASE_ROOTFS",
                base.display(),
                config.base_distro
            ),
        )
    }
}

fn check_supervisor(config: &Config) -> CheckResult {
    match supervisor::check_artifact(&config.supervisor_binary) {
        Ok(()) => CheckResult::pass_with(
            "Supervisor binary",
            &config.supervisor_binary.display().to_string(),
        ),
        Err(CompositionError::MissingSupervisor(path)) => CheckResult::fail(
            "Supervisor binary",
            &format!(
                "{} not found. Build with: cargo build --release --target x86_64-unknown-linux-musl",
                path.display()
            ),
        ),
        Err(e) => CheckResult::fail("Supervisor binary", &e.to_string()),
    }
}

fn check_privileges() -> CheckResult {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } == 0 {
        CheckResult::pass("Running as root")
    } else {
        CheckResult::warn(
            "Running as root",
            "Not root. File ownership and device nodes will not be preserved",
        )
    }
}
