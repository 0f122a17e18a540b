use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{select, tick};
use log::{info, warn};

use crate::config::AgentConfig;
use crate::module::ModuleReport;
use crate::transport::{Transport, send_or_log};
use crate::watcher::{CheckOutcome, ServiceWatcher, WatchContext};

struct Supervised {
    watcher: ServiceWatcher,
    death_logged: bool,
}

/// Top‑level agent driving every configured watcher.
pub struct Agent {
    modules: Vec<Supervised>,
    transport: Arc<dyn Transport>,
    interval: Duration,
}

impl Agent {
    /// Build one watcher per configured definition.
    pub fn new(cfg: &AgentConfig, ctx: WatchContext) -> Self {
        let wait_timeout = Duration::from_secs(cfg.wait_timeout_secs);
        let modules = cfg
            .watchers
            .iter()
            .map(|def| {
                info!(
                    "Watching service '{}' as '{}' (async: {}, watchdog: {})",
                    def.service, def.name, def.is_async, def.watchdog
                );
                Supervised {
                    watcher: ServiceWatcher::new(def.name.clone(), &def.service, ctx.clone())
                        .with_interval(def.interval)
                        .with_async(def.is_async)
                        .with_watchdog(def.watchdog)
                        .with_wait_timeout(wait_timeout),
                    death_logged: false,
                }
            })
            .collect();

        Self {
            modules,
            transport: ctx.transport,
            interval: Duration::from_secs(cfg.interval_secs),
        }
    }

    pub fn watchers(&self) -> impl Iterator<Item = &ServiceWatcher> {
        self.modules.iter().map(|m| &m.watcher)
    }

    /// Run every due watcher once and send the outputs as one batch.
    ///
    /// Returns the number of modules reported.
    pub fn run_cycle(&mut self) -> usize {
        let mut batch: Vec<ModuleReport> = Vec::new();

        for module in &mut self.modules {
            if let CheckOutcome::Checked(_) = module.watcher.run() {
                batch.extend(module.watcher.report());
            }

            if !module.death_logged && module.watcher.watch_loop_died() {
                warn!(
                    "Watch loop for {} has stopped; transitions are only seen on scheduled checks",
                    module.watcher.service_name()
                );
                module.death_logged = true;
            }
        }

        if !batch.is_empty() {
            send_or_log(self.transport.as_ref(), &batch);
        }
        batch.len()
    }

    /// Central agent loop. Runs until SIGINT / SIGTERM.
    pub fn run(mut self) -> Result<()> {
        self.run_cycle();

        let cycle_tick = tick(self.interval);
        let sig_tick = tick(Duration::from_millis(200));

        loop {
            select! {
                recv(cycle_tick) -> _ => {
                    self.run_cycle();
                }
                recv(sig_tick) -> _ => {
                    if let Some(sig) = check_signals() { // coarse polling ≈200 ms
                        info!("signal {sig} – orderly shutdown");
                        break;
                    }
                }
            }
        }

        for module in &mut self.modules {
            if let Some(exit) = module.watcher.shutdown() {
                info!("{} watch loop exited: {exit:?}", module.watcher.service_name());
            }
        }
        Ok(())
    }
}

// Cheap, polling‑based Unix signal handling (lock‑free).
static RECEIVED_SIGNAL: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(0);

#[cfg(unix)]
pub fn install_signal_handlers() -> anyhow::Result<()> {
    use nix::sys::signal::{self, Signal};
    extern "C" fn handler(sig: i32) {
        RECEIVED_SIGNAL.store(sig, std::sync::atomic::Ordering::SeqCst);
    }
    let action = signal::SigAction::new(
        signal::SigHandler::Handler(handler),
        signal::SaFlags::empty(),
        signal::SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
            anyhow::anyhow!(
                "Failed to register {sig} handler: {e}. Signal handling is required for agent operation."
            )
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_handlers() -> anyhow::Result<()> {
    Ok(())
}

/// Non‑blocking check – returns the signal name once.
fn check_signals() -> Option<String> {
    use std::sync::atomic::Ordering::AcqRel;

    match RECEIVED_SIGNAL.swap(0, AcqRel) {
        0 => None,
        val => signal_name(val),
    }
}

#[cfg(unix)]
fn signal_name(val: i32) -> Option<String> {
    match nix::sys::signal::Signal::try_from(val) {
        Ok(sig) => Some(sig.to_string()),
        Err(e) => {
            log::error!("BUG: Invalid signal number {val} from signal handler: {e}.");
            None
        }
    }
}

#[cfg(not(unix))]
fn signal_name(val: i32) -> Option<String> {
    Some(val.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::WatcherDefinition;
    use crate::control::ServiceControl;
    use crate::events::IdleEventSource;

    struct AlwaysRunning;

    impl ServiceControl for AlwaysRunning {
        fn is_running(&self, _service: &str) -> crate::error::Result<bool> {
            Ok(true)
        }

        fn start(&self, _service: &str) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Batches(Mutex<Vec<Vec<ModuleReport>>>);

    impl Transport for Batches {
        fn send(&self, reports: &[ModuleReport]) -> crate::error::Result<()> {
            self.0.lock().unwrap().push(reports.to_vec());
            Ok(())
        }
    }

    fn definition(name: &str, interval: u32) -> WatcherDefinition {
        WatcherDefinition {
            name: name.to_string(),
            service: name.to_uppercase(),
            watchdog: false,
            is_async: false,
            interval,
        }
    }

    #[test]
    fn cycle_batches_due_watchers_only() {
        let batches = Arc::new(Batches::default());
        let cfg = AgentConfig {
            watchers: vec![definition("every", 1), definition("second", 2)],
            ..AgentConfig::default()
        };
        let mut agent = Agent::new(
            &cfg,
            WatchContext {
                control: Arc::new(AlwaysRunning),
                events: Arc::new(IdleEventSource),
                transport: batches.clone(),
            },
        );

        assert_eq!(agent.run_cycle(), 2);
        assert_eq!(agent.run_cycle(), 1);

        let sent = batches.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1][0].name, "every");
        assert_eq!(sent[1][0].data, "1");
        assert!(agent.watchers().all(|w| w.service_name() == w.name()));
    }
}
