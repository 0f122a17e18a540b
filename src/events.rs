//! Platform service-control event channel
//!
//! A watcher learns about service transitions from the platform's service
//! manager log:
//! - Windows: the "Service Control Manager" event log
//! - Linux: the systemd journal (journalctl --follow)
//! - macOS: no usable notification channel; watchers poll

use std::time::Duration;

use crate::error::Result;

/// Name of the log the service manager writes transitions to.
pub const SERVICE_CONTROL_LOG: &str = "Service Control Manager";

/// Event identifier for "the service entered the running/stopped state".
pub const SERVICE_STATE_CHANGED: u32 = 7036;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod journal;
        pub use journal::JournalEventSource as SystemEventSource;
    } else if #[cfg(target_os = "windows")] {
        mod eventlog;
        pub use eventlog::WindowsEventSource as SystemEventSource;
    } else {
        pub use self::IdleEventSource as SystemEventSource;
    }
}

/// Whether the host emits service-control change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Notifications,
    PollingOnly,
}

/// Severity class of an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Error,
    Warning,
    Information,
    AuditSuccess,
    AuditFailure,
}

/// One record read from the service-control log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub category: EventCategory,
    pub event_id: u32,
}

impl EventRecord {
    pub fn new(category: EventCategory, event_id: u32) -> Self {
        Self { category, event_id }
    }

    /// True for informational "service started/stopped" records.
    ///
    /// Only the low 16 bits of the identifier carry the event code; the high
    /// bits hold severity and facility flags.
    pub fn is_service_state_change(&self) -> bool {
        self.category == EventCategory::Information
            && self.event_id & 0x0000_ffff == SERVICE_STATE_CHANGED
    }
}

/// Why a [`EventLog::wait`] call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Notified,
    TimedOut,
}

/// Opens the service-control log and reports platform capability.
pub trait EventSource: Send + Sync {
    fn capability(&self) -> Capability;

    /// Open `log_name` and register for change notification.
    fn open(&self, log_name: &str) -> Result<Box<dyn EventLog>>;
}

/// An open log with a registered change notification.
///
/// Dropping the log releases the notification and the log handle.
pub trait EventLog: Send {
    /// Block for at most `timeout` waiting for new records.
    fn wait(&mut self, timeout: Duration) -> Result<Wake>;

    /// Drain the records that are available right now.
    fn read_available(&mut self) -> Result<Vec<EventRecord>>;
}

/// Event source for hosts without a notification channel.
///
/// Its logs never fire, so every wait runs to its timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleEventSource;

impl EventSource for IdleEventSource {
    fn capability(&self) -> Capability {
        Capability::PollingOnly
    }

    fn open(&self, _log_name: &str) -> Result<Box<dyn EventLog>> {
        Ok(Box::new(IdleLog))
    }
}

struct IdleLog;

impl EventLog for IdleLog {
    fn wait(&mut self, timeout: Duration) -> Result<Wake> {
        std::thread::sleep(timeout);
        Ok(Wake::TimedOut)
    }

    fn read_available(&mut self) -> Result<Vec<EventRecord>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_change_requires_information_category() {
        assert!(EventRecord::new(EventCategory::Information, 7036).is_service_state_change());
        assert!(!EventRecord::new(EventCategory::Warning, 7036).is_service_state_change());
        assert!(!EventRecord::new(EventCategory::Information, 7040).is_service_state_change());
    }

    #[test]
    fn state_change_ignores_high_identifier_bits() {
        let record = EventRecord::new(EventCategory::Information, 0x4000_0000 | 7036);
        assert!(record.is_service_state_change());
    }
}
