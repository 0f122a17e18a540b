#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use svcwatch::events::{Capability, EventLog, EventRecord, EventSource, Wake};
use svcwatch::module::ModuleReport;
use svcwatch::transport::Transport;
use svcwatch::{LoopExit, Result, ServiceWatcher, WatchContext, WatchError};

/// Service control answering from a script; repeats its last answer once
/// the script runs out.
#[derive(Default)]
pub struct ScriptedControl {
    states: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
    /// 1-based query number that blocks for the given time before answering.
    slow_query: Option<(usize, Duration)>,
    pub queries: Mutex<Vec<String>>,
    pub starts: Mutex<Vec<String>>,
}

impl ScriptedControl {
    pub fn new(states: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(states.iter().copied().collect()),
            ..Self::default()
        })
    }

    /// Like [`ScriptedControl::new`], but query number `nth` takes `delay`.
    pub fn with_slow_query(states: &[bool], nth: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(states.iter().copied().collect()),
            slow_query: Some((nth, delay)),
            ..Self::default()
        })
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }
}

impl svcwatch::control::ServiceControl for ScriptedControl {
    fn is_running(&self, service: &str) -> Result<bool> {
        let nth = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(service.to_string());
            queries.len()
        };
        if let Some((slow, delay)) = self.slow_query {
            if slow == nth {
                thread::sleep(delay);
            }
        }
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.states.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(*last)
    }

    fn start(&self, service: &str) -> Result<()> {
        self.starts.lock().unwrap().push(service.to_string());
        Ok(())
    }
}

/// Transport remembering every batch it was handed.
#[derive(Default)]
pub struct RecordingTransport {
    pub batches: Mutex<Vec<Vec<ModuleReport>>>,
    pub fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// Data of every reported module, in order.
    pub fn reported(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|r| r.data.clone())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, reports: &[ModuleReport]) -> Result<()> {
        self.batches.lock().unwrap().push(reports.to_vec());
        if self.fail {
            return Err(WatchError::Transport("collector unreachable".into()));
        }
        Ok(())
    }
}

/// What one opened log does on its single wait.
#[derive(Debug, Clone)]
pub enum Step {
    TimedOut,
    Notified(Vec<EventRecord>),
}

/// Event source replaying one [`Step`] per opened log.
///
/// Once the script is exhausted, `open` fails (ending the loop) unless the
/// source is endless, in which case every further log simply times out.
pub struct ScriptedEvents {
    capabilities: Mutex<VecDeque<Capability>>,
    steps: Mutex<VecDeque<Step>>,
    endless: bool,
    pub capability_calls: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl ScriptedEvents {
    pub fn new(capability: Capability, steps: Vec<Step>) -> Arc<Self> {
        Self::with_capabilities(vec![capability], steps, false)
    }

    pub fn endless(capability: Capability) -> Arc<Self> {
        Self::with_capabilities(vec![capability], vec![], true)
    }

    pub fn with_capabilities(
        capabilities: Vec<Capability>,
        steps: Vec<Step>,
        endless: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            capabilities: Mutex::new(capabilities.into()),
            steps: Mutex::new(steps.into()),
            endless,
            capability_calls: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl EventSource for ScriptedEvents {
    fn capability(&self) -> Capability {
        self.capability_calls.fetch_add(1, Ordering::SeqCst);
        let mut caps = self.capabilities.lock().unwrap();
        if caps.len() > 1 {
            caps.pop_front().unwrap()
        } else {
            caps[0]
        }
    }

    fn open(&self, log_name: &str) -> Result<Box<dyn EventLog>> {
        let step = match self.steps.lock().unwrap().pop_front() {
            Some(step) => step,
            None if self.endless => Step::TimedOut,
            None => {
                return Err(WatchError::OpenLog {
                    log: log_name.to_string(),
                    reason: "script exhausted".into(),
                });
            }
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedLog {
            step,
            sleep_on_timeout: self.endless,
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct ScriptedLog {
    step: Step,
    sleep_on_timeout: bool,
    closed: Arc<AtomicUsize>,
}

impl EventLog for ScriptedLog {
    fn wait(&mut self, timeout: Duration) -> Result<Wake> {
        match self.step {
            Step::TimedOut => {
                if self.sleep_on_timeout {
                    thread::sleep(timeout);
                }
                Ok(Wake::TimedOut)
            }
            Step::Notified(_) => Ok(Wake::Notified),
        }
    }

    fn read_available(&mut self) -> Result<Vec<EventRecord>> {
        match &mut self.step {
            Step::Notified(records) => Ok(std::mem::take(records)),
            Step::TimedOut => Ok(Vec::new()),
        }
    }
}

impl Drop for ScriptedLog {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn context(
    control: &Arc<ScriptedControl>,
    events: &Arc<ScriptedEvents>,
    transport: &Arc<RecordingTransport>,
) -> WatchContext {
    WatchContext {
        control: control.clone(),
        events: events.clone(),
        transport: transport.clone(),
    }
}

/// Wait for a scripted loop to run out of script, then collect its exit.
pub fn finish(watcher: &mut ServiceWatcher) -> Option<LoopExit> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while watcher.is_watching() {
        assert!(Instant::now() < deadline, "watch loop did not finish");
        thread::sleep(Duration::from_millis(2));
    }
    watcher.shutdown()
}

pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}
