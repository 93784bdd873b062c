//! Host tool availability checks.

use crate::process;

use super::types::CheckResult;

/// Check host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    let mut results = Vec::new();

    // Either the distro apk or the standalone static build works.
    let apk = ["apk", "apk.static"]
        .iter()
        .find_map(|tool| process::which(tool));
    results.push(match apk {
        Some(path) => CheckResult::pass_with("apk", &path.display().to_string()),
        None => CheckResult::fail(
            "apk",
            "Not found. Install 'apk-tools' or put apk.static in PATH. Required to install the runtime",
        ),
    });

    let required_tools = [("tar", "tar", "Required to unpack minirootfs tarballs")];
    for (tool, package, purpose) in required_tools {
        results.push(check_tool_exists(tool, package, purpose));
    }

    results
}

fn check_tool_exists(tool: &str, package: &str, purpose: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path.display().to_string()),
        None => CheckResult::fail(
            tool,
            &format!("Not found. Install '{}' package. {}", package, purpose),
        ),
    }
}
