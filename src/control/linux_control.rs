//! Linux service control using systemd (systemctl)

use anyhow::{Context, Result};
use std::process::Command;

/// Map a bare service name onto its systemd unit name
fn unit_name(service: &str) -> String {
    if service.contains('.') {
        service.to_string()
    } else {
        format!("{service}.service")
    }
}

/// `--user` unless running as root
fn scope() -> &'static [&'static str] {
    if is_root() {
        &[]
    } else {
        &["--user"]
    }
}

/// Unit listings searched for a name, loaded units first
const UNIT_LISTINGS: [&[&str]; 2] = [
    &["list-units", "--all", "--plain", "--no-legend", "--full"],
    &["list-unit-files", "--no-legend", "--full"],
];

/// Resolve a (lower-cased) service name to the unit systemd knows.
///
/// Watchers store service names lower-cased, but unit names are case
/// sensitive (`NetworkManager.service`). Falls back to the plain unit name
/// when no listing has a match.
fn resolve_unit(service: &str) -> String {
    let wanted = unit_name(service);
    for listing in UNIT_LISTINGS {
        let output = Command::new("systemctl")
            .args(scope())
            .args(listing)
            .output();
        match output {
            Ok(out) if out.status.success() => {
                if let Some(unit) = find_unit(&String::from_utf8_lossy(&out.stdout), &wanted) {
                    return unit;
                }
            }
            Ok(_) => {}
            Err(e) => log::debug!("Failed to list systemd units: {e}"),
        }
    }
    wanted
}

/// Find `wanted` in a unit listing, preferring an exact match over a
/// case-insensitive one
fn find_unit(listing: &str, wanted: &str) -> Option<String> {
    let units = listing.lines().filter_map(|line| {
        line.split_whitespace()
            .find(|token| !matches!(*token, "●" | "*"))
    });
    let mut folded = None;
    for unit in units {
        if unit == wanted {
            return Some(unit.to_string());
        }
        if folded.is_none() && unit.eq_ignore_ascii_case(wanted) {
            folded = Some(unit.to_string());
        }
    }
    folded
}

/// Check if a service is running via systemctl is-active
///
/// Returns: Ok(true) if the unit is active, Ok(false) otherwise
pub fn is_running(service: &str) -> Result<bool> {
    let unit = resolve_unit(service);

    let output = Command::new("systemctl")
        .args(scope())
        .args(["is-active", unit.as_str()])
        .output()
        .context("Failed to execute systemctl is-active")?;

    // systemctl is-active returns:
    // - Exit 0 if active
    // - Exit 3 if inactive
    // - Other codes for other states
    Ok(output.status.success())
}

/// Start a service via systemctl start
pub fn start_service(service: &str) -> Result<()> {
    let unit = resolve_unit(service);

    let output = Command::new("systemctl")
        .args(scope())
        .args(["start", unit.as_str()])
        .output()
        .context("Failed to execute systemctl start")?;

    if !output.status.success() {
        anyhow::bail!(
            "Failed to start {}: {}",
            unit,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(())
}

/// Check if running as root
#[inline]
pub(crate) fn is_root() -> bool {
    nix::unistd::getuid().is_root()
}
