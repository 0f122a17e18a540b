//! macOS service control using launchd (launchctl)
//!
//! Service names are launchd labels, e.g. `com.openssh.sshd`.

use anyhow::{Context, Result};
use std::process::Command;

/// Check if a job is running via launchctl list
///
/// Returns: Ok(true) if the job is loaded and has a PID, Ok(false) otherwise
pub fn is_running(label: &str) -> Result<bool> {
    let output = Command::new("launchctl")
        .arg("list")
        .output()
        .context("Failed to execute launchctl list")?;

    if !output.status.success() {
        anyhow::bail!(
            "launchctl list failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(parse_list_output(&String::from_utf8_lossy(&output.stdout), label))
}

/// Output format: "PID\tStatus\tLabel"
/// If PID is "-", the job is loaded but not running.
/// Labels are compared case-insensitively since watchers lower-case them.
fn parse_list_output(stdout: &str, label: &str) -> bool {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [pid, _status, job] => Some((*pid, *job)),
                _ => None,
            }
        })
        .any(|(pid, job)| job.eq_ignore_ascii_case(label) && pid != "-")
}

/// Start a job via launchctl kickstart
pub fn start_service(label: &str) -> Result<()> {
    let target = if nix::unistd::getuid().is_root() {
        format!("system/{label}")
    } else {
        format!("gui/{}/{label}", nix::unistd::getuid())
    };

    let output = Command::new("launchctl")
        .args(["kickstart", &target])
        .output()
        .context("Failed to execute launchctl kickstart")?;

    if !output.status.success() {
        // Fallback to legacy start command
        let start_output = Command::new("launchctl")
            .args(["start", label])
            .output()
            .context("Failed to execute launchctl start")?;

        if !start_output.status.success() {
            anyhow::bail!(
                "Failed to start {}: {}",
                label,
                String::from_utf8_lossy(&start_output.stderr)
            );
        }
    }

    Ok(())
}
