//! Change detection and watchdog remediation.

use std::sync::atomic::Ordering;

use log::{info, warn};

use super::Shared;
use crate::transport::send_or_log;

pub(crate) const STOPPED: &str = "0";

impl Shared {
    /// Current state in its canonical output form.
    ///
    /// A failed query reads as stopped, the same as a service that does not
    /// exist.
    pub(crate) fn query(&self) -> String {
        let running = match self.control.is_running(&self.service) {
            Ok(running) => running,
            Err(e) => {
                warn!("{e}");
                false
            }
        };
        u8::from(running).to_string()
    }

    /// Copy the latest output into the last-reported state and return it.
    ///
    /// The watch loop calls this once at startup so the state recorded by
    /// the synchronous check is not reported a second time.
    pub(crate) fn seed_last_reported(&self) -> Option<String> {
        let mut observed = self.observed();
        observed.last_reported = observed.output.clone();
        observed.last_reported.clone()
    }

    /// Start the service if `state` is stopped and the watchdog is on.
    pub(crate) fn apply_watchdog(&self, state: &str) {
        if state != STOPPED || !self.watchdog.load(Ordering::Acquire) {
            return;
        }
        info!("Starting service {}", self.service);
        // Confirmation comes from the next detection cycle
        if let Err(e) = self.control.start(&self.service) {
            warn!("Watchdog could not start {}: {e}", self.service);
        }
    }

    /// Report the service state if it changed, then apply the watchdog.
    ///
    /// The observed lock is held from comparison through transport hand-off,
    /// so concurrent evaluations cannot report one transition twice or
    /// out of order.
    pub(crate) fn evaluate(&self) -> Option<String> {
        let mut observed = self.observed();

        let state = self.query();
        if observed.last_reported.as_deref() == Some(state.as_str()) {
            return None;
        }

        observed.output = Some(state.clone());
        observed.last_reported = Some(state.clone());
        info!("Service {} changed state to {state}", self.service);
        send_or_log(self.transport.as_ref(), &[self.report(state.clone())]);
        drop(observed);

        self.apply_watchdog(&state);
        Some(state)
    }
}
