//! Service control - delegates to OS-native service managers
//!
//! Provides a unified interface for querying and starting a named service:
//! - macOS: launchd (launchctl)
//! - Linux: systemd (systemctl)
//! - Windows: Service Control Manager (Windows API)

use crate::error::{Result, WatchError};

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        mod macos_control;
        use macos_control as platform;
    } else if #[cfg(target_os = "linux")] {
        mod linux_control;
        use linux_control as platform;
        pub(crate) use linux_control::is_root;
    } else if #[cfg(target_os = "windows")] {
        mod windows_control;
        use windows_control as platform;
    }
}

/// Answers "is service X running" and can issue "start service X".
///
/// Implementations must be callable from the watcher's background thread.
pub trait ServiceControl: Send + Sync {
    /// Returns `Ok(true)` if the service is running, `Ok(false)` if stopped
    fn is_running(&self, service: &str) -> Result<bool>;

    /// Ask the service manager to start the service. Does not wait for it.
    fn start(&self, service: &str) -> Result<()>;
}

/// [`ServiceControl`] backed by the host's service manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemServiceControl;

impl ServiceControl for SystemServiceControl {
    fn is_running(&self, service: &str) -> Result<bool> {
        platform::is_running(service).map_err(|e| WatchError::Control {
            service: service.to_string(),
            reason: format!("{e:#}"),
        })
    }

    fn start(&self, service: &str) -> Result<()> {
        platform::start_service(service).map_err(|e| WatchError::Control {
            service: service.to_string(),
            reason: format!("{e:#}"),
        })
    }
}
