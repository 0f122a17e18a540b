//! Service watcher module
//!
//! A [`ServiceWatcher`] checks one service synchronously on every agent cycle
//! it is due, and (when asynchronous) owns a background thread that reports
//! running/stopped transitions the moment the platform announces them.

mod detector;
mod watch_loop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded};
use log::{error, info};

use crate::control::ServiceControl;
use crate::events::EventSource;
use crate::module::{IntervalGate, ModuleReport, SERVICE_MODULE_KIND};
use crate::transport::Transport;

pub use watch_loop::{DetectionMode, LoopExit};

/// Default bound on a single wait for service-control notifications.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators a watcher talks to.
#[derive(Clone)]
pub struct WatchContext {
    pub control: Arc<dyn ServiceControl>,
    pub events: Arc<dyn EventSource>,
    pub transport: Arc<dyn Transport>,
}

/// Result of one synchronous check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The module interval has not elapsed; nothing was done.
    Skipped,
    /// The service was queried; carries the recorded output.
    Checked(String),
}

/// Output and last-reported state, guarded together.
#[derive(Debug, Default)]
struct Observed {
    output: Option<String>,
    last_reported: Option<String>,
}

/// State shared between the synchronous check path and the watch loop.
pub(crate) struct Shared {
    name: String,
    service: String,
    watchdog: AtomicBool,
    observed: Mutex<Observed>,
    control: Arc<dyn ServiceControl>,
    transport: Arc<dyn Transport>,
}

impl Shared {
    fn observed(&self) -> MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report(&self, data: String) -> ModuleReport {
        ModuleReport {
            name: self.name.clone(),
            kind: SERVICE_MODULE_KIND,
            data,
        }
    }
}

/// Handle to a running watch loop.
///
/// Dropping it disconnects the cancel channel; the loop notices at its next
/// wait or read boundary, releases its log handles and exits.
struct WatchWorker {
    cancel: Sender<()>,
    thread: JoinHandle<LoopExit>,
}

impl WatchWorker {
    fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Cancel the loop and wait for it to exit.
    fn shutdown(self) -> Option<LoopExit> {
        let WatchWorker { cancel, thread } = self;
        drop(cancel);
        thread.join().ok()
    }
}

/// Watches one operating-system service.
pub struct ServiceWatcher {
    shared: Arc<Shared>,
    events: Arc<dyn EventSource>,
    gate: IntervalGate,
    is_async: bool,
    start_async: bool,
    wait_timeout: Duration,
    worker: Option<WatchWorker>,
}

impl ServiceWatcher {
    /// Create a watcher. The service identifier is lower-cased so that
    /// identifiers differing only in case watch the same service.
    pub fn new(name: impl Into<String>, service: &str, ctx: WatchContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                service: service.to_lowercase(),
                watchdog: AtomicBool::new(false),
                observed: Mutex::new(Observed::default()),
                control: ctx.control,
                transport: ctx.transport,
            }),
            events: ctx.events,
            gate: IntervalGate::new(1),
            is_async: false,
            start_async: false,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            worker: None,
        }
    }

    /// Run the synchronous check only every `interval` agent cycles.
    #[must_use]
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.gate = IntervalGate::new(interval);
        self
    }

    /// Start a background watch loop on the first due check.
    #[must_use]
    pub fn with_async(mut self, enabled: bool) -> Self {
        self.is_async = enabled;
        self.start_async = enabled;
        self
    }

    #[must_use]
    pub fn with_watchdog(self, enabled: bool) -> Self {
        self.set_watchdog(enabled);
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn service_name(&self) -> &str {
        &self.shared.service
    }

    pub fn is_watchdog(&self) -> bool {
        self.shared.watchdog.load(Ordering::Acquire)
    }

    /// Takes effect immediately, including for a running watch loop.
    pub fn set_watchdog(&self, enabled: bool) {
        self.shared.watchdog.store(enabled, Ordering::Release);
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Latest recorded output, `"1"` running or `"0"` stopped.
    pub fn output(&self) -> Option<String> {
        self.shared.observed().output.clone()
    }

    /// Current output as a transport report, if the service was checked yet.
    pub fn report(&self) -> Option<ModuleReport> {
        self.output().map(|data| self.shared.report(data))
    }

    /// True while a background watch loop is alive.
    pub fn is_watching(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// True when a background loop was started and has since exited on its
    /// own; the watcher no longer reports transitions.
    pub fn watch_loop_died(&self) -> bool {
        self.worker.as_ref().is_some_and(WatchWorker::is_finished)
    }

    /// Query the service now and report it if its state changed since the
    /// last report. Returns the reported state.
    pub fn evaluate(&self) -> Option<String> {
        self.shared.evaluate()
    }

    /// Synchronous check, run once per agent cycle.
    ///
    /// Skips silently while the interval has not elapsed. Otherwise records
    /// the current state as output and, for asynchronous watchers, starts the
    /// background watch loop exactly once.
    pub fn run(&mut self) -> CheckOutcome {
        if !self.gate.fulfilled() {
            return CheckOutcome::Skipped;
        }

        // Held across the query so a concurrent evaluation cannot land
        // between it and the store
        let mut observed = self.shared.observed();
        let state = self.shared.query();
        observed.output = Some(state.clone());
        drop(observed);

        if self.start_async {
            self.spawn_worker();
            self.start_async = false;
        }

        CheckOutcome::Checked(state)
    }

    fn spawn_worker(&mut self) {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let watch = watch_loop::WatchLoop::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.events),
            self.wait_timeout,
            cancel_rx,
        );

        match thread::Builder::new()
            .name(format!("watch-{}", self.shared.service))
            .spawn(move || watch.run())
        {
            Ok(thread) => {
                info!("Watching service {} asynchronously", self.shared.service);
                self.worker = Some(WatchWorker {
                    cancel: cancel_tx,
                    thread,
                });
            }
            Err(e) => error!(
                "Failed to start watch thread for {}: {e}",
                self.shared.service
            ),
        }
    }

    /// Cancel the background loop, if any, and wait for it to exit.
    pub fn shutdown(&mut self) -> Option<LoopExit> {
        self.worker.take().and_then(WatchWorker::shutdown)
    }
}
