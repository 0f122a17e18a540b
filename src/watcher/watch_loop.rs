//! Background watch loop
//!
//! Each cycle opens the service-control log, registers for change
//! notification and waits a bounded time. A notification drains the log and
//! re-evaluates the service when any record announces a service state
//! change. A timeout re-evaluates only when the host cannot notify. The log
//! is closed again at the end of every cycle so a stale handle never
//! outlives one wait.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use log::{debug, error, info, warn};

use super::Shared;
use crate::events::{Capability, EventRecord, EventSource, SERVICE_CONTROL_LOG, Wake};

/// How a watch loop learns about transitions. Fixed for a loop's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    EventDriven,
    Polling,
}

impl From<Capability> for DetectionMode {
    fn from(capability: Capability) -> Self {
        match capability {
            Capability::Notifications => DetectionMode::EventDriven,
            Capability::PollingOnly => DetectionMode::Polling,
        }
    }
}

/// Why a watch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The owning watcher cancelled it.
    Cancelled,
    /// The service-control log could not be opened. Not retried.
    OpenFailed,
}

pub(crate) struct WatchLoop {
    shared: Arc<Shared>,
    events: Arc<dyn EventSource>,
    wait_timeout: Duration,
    cancel: Receiver<()>,
}

impl WatchLoop {
    pub(crate) fn new(
        shared: Arc<Shared>,
        events: Arc<dyn EventSource>,
        wait_timeout: Duration,
        cancel: Receiver<()>,
    ) -> Self {
        Self {
            shared,
            events,
            wait_timeout,
            cancel,
        }
    }

    pub(crate) fn run(self) -> LoopExit {
        let service = self.shared.service.as_str();
        let mode = DetectionMode::from(self.events.capability());
        if mode == DetectionMode::Polling {
            info!("Async polling service {service} on this host");
        }

        // A stop seen by the synchronous check is never reported by the
        // loop, so it is remediated here instead
        if let Some(seeded) = self.shared.seed_last_reported() {
            self.shared.apply_watchdog(&seeded);
        }

        loop {
            if self.cancelled() {
                return LoopExit::Cancelled;
            }

            let mut log = match self.events.open(SERVICE_CONTROL_LOG) {
                Ok(log) => log,
                Err(e) => {
                    error!("Could not open event log for {service}: {e}");
                    return LoopExit::OpenFailed;
                }
            };

            match log.wait(self.wait_timeout) {
                Ok(Wake::TimedOut) => {
                    if mode == DetectionMode::Polling && !self.cancelled() {
                        self.shared.evaluate();
                    }
                }
                Ok(Wake::Notified) => {
                    if self.cancelled() {
                        return LoopExit::Cancelled;
                    }
                    match log.read_available() {
                        Ok(records) => {
                            if records.iter().any(EventRecord::is_service_state_change) {
                                self.shared.evaluate();
                            } else {
                                debug!("{} unrelated event(s) for {service}", records.len());
                            }
                        }
                        Err(e) => warn!("Reading event log for {service} failed: {e}"),
                    }
                }
                Err(e) => {
                    warn!("Waiting on event log for {service} failed: {e}");
                    drop(log);
                    if self.pause() {
                        return LoopExit::Cancelled;
                    }
                }
            }
        }
    }

    /// True once the owning watcher signalled or went away.
    fn cancelled(&self) -> bool {
        matches!(
            self.cancel.try_recv(),
            Ok(()) | Err(TryRecvError::Disconnected)
        )
    }

    /// Sleep one wait period after a failed wait, waking early on cancel.
    fn pause(&self) -> bool {
        !matches!(
            self.cancel.recv_timeout(self.wait_timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_selects_mode() {
        assert_eq!(
            DetectionMode::from(Capability::Notifications),
            DetectionMode::EventDriven
        );
        assert_eq!(
            DetectionMode::from(Capability::PollingOnly),
            DetectionMode::Polling
        );
    }
}
