//! systemd journal as the service-control log
//!
//! Each open log runs `journalctl --follow` over the service manager's own
//! messages, starting after the last entry the previous log handed out, and
//! forwards parsed records through a channel. Unit lifecycle
//! messages are translated to the service-state-changed event code.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use log::debug;
use serde_json::Value;

use super::{
    Capability, EventCategory, EventLog, EventRecord, EventSource, SERVICE_STATE_CHANGED, Wake,
};
use crate::error::{Result, WatchError};

/// Catalog message IDs systemd emits when a unit finishes starting or stopping.
const UNIT_LIFECYCLE_MESSAGE_IDS: [&str; 3] = [
    "39f53479d3a045ac8e11786248231fbf", // unit started
    "9d1aaa27d60140bd96365438aad20286", // unit stopped
    "be02cf6855d2428ba40df7e9d022f03d", // unit failed
];

/// Follows the journal across reopened logs.
///
/// The cursor of the last record handed to the watch loop is kept between
/// cycles, so each newly opened log resumes right after it and nothing
/// written while no `journalctl` was running is skipped.
#[derive(Debug, Default, Clone)]
pub struct JournalEventSource {
    cursor: Arc<Mutex<Option<String>>>,
}

impl JournalEventSource {
    /// Journal matches selecting the service manager's own messages.
    fn filter_args() -> Vec<String> {
        if crate::control::is_root() {
            // Messages written by the system manager itself
            vec!["_PID=1".to_string()]
        } else {
            vec!["--user".to_string()]
        }
    }

    /// Arguments for the `journalctl --follow` process of the next log.
    fn follow_args(&self) -> Vec<String> {
        let mut args = vec!["--follow".to_string(), "--output=json".to_string()];
        match lock(&self.cursor).as_deref() {
            Some(cursor) => args.push(format!("--after-cursor={cursor}")),
            None => args.push("--lines=0".to_string()),
        }
        args.extend(Self::filter_args());
        args
    }

    /// Anchor the cursor at the current end of the journal, once.
    fn anchor_cursor(&self) {
        let mut cursor = lock(&self.cursor);
        if cursor.is_some() {
            return;
        }
        let output = Command::new("journalctl")
            .args(["--lines=1", "--output=json"])
            .args(Self::filter_args())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(out) => {
                *cursor = String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .filter_map(parse_journal_line)
                    .filter_map(|entry| entry.cursor)
                    .last();
            }
            Err(e) => debug!("Could not read journal tail cursor: {e}"),
        }
    }
}

impl EventSource for JournalEventSource {
    fn capability(&self) -> Capability {
        if which::which("journalctl").is_ok() {
            Capability::Notifications
        } else {
            Capability::PollingOnly
        }
    }

    fn open(&self, log_name: &str) -> Result<Box<dyn EventLog>> {
        let open_err = |reason: String| WatchError::OpenLog {
            log: log_name.to_string(),
            reason,
        };

        self.anchor_cursor();

        let mut child = Command::new("journalctl")
            .args(self.follow_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| open_err(format!("failed to spawn journalctl: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| open_err("journalctl stdout not captured".to_string()))?;

        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name("journal-reader".into())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if let Some(entry) = parse_journal_line(&line) {
                        if tx.send(entry).is_err() {
                            break;
                        }
                    }
                }
            })
            .map_err(|e| open_err(format!("failed to spawn reader thread: {e}")))?;

        Ok(Box::new(JournalLog {
            child,
            entries: EntryQueue::new(log_name, rx, Arc::clone(&self.cursor)),
        }))
    }
}

fn lock(cursor: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
    cursor.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One parsed journal entry.
#[derive(Debug, Clone)]
struct JournalEntry {
    record: EventRecord,
    cursor: Option<String>,
}

/// Entries received from `journalctl`, committed to the shared cursor only
/// once they are handed to the caller. Entries still queued when the log is
/// dropped are read again by the next log.
struct EntryQueue {
    log: String,
    entries: Receiver<JournalEntry>,
    pending: Vec<JournalEntry>,
    cursor: Arc<Mutex<Option<String>>>,
}

impl EntryQueue {
    fn new(
        log: &str,
        entries: Receiver<JournalEntry>,
        cursor: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            log: log.to_string(),
            entries,
            pending: Vec::new(),
            cursor,
        }
    }

    fn wait(&mut self, timeout: Duration) -> Result<Wake> {
        if !self.pending.is_empty() {
            return Ok(Wake::Notified);
        }
        match self.entries.recv_timeout(timeout) {
            Ok(entry) => {
                self.pending.push(entry);
                Ok(Wake::Notified)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Wake::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(WatchError::EventLog {
                log: self.log.clone(),
                reason: "journalctl exited".to_string(),
            }),
        }
    }

    fn drain(&mut self) -> Vec<EventRecord> {
        let mut drained = std::mem::take(&mut self.pending);
        drained.extend(self.entries.try_iter());

        if let Some(latest) = drained.iter().rev().find_map(|e| e.cursor.clone()) {
            *lock(&self.cursor) = Some(latest);
        }
        drained.into_iter().map(|e| e.record).collect()
    }
}

struct JournalLog {
    child: Child,
    entries: EntryQueue,
}

impl EventLog for JournalLog {
    fn wait(&mut self, timeout: Duration) -> Result<Wake> {
        self.entries.wait(timeout)
    }

    fn read_available(&mut self) -> Result<Vec<EventRecord>> {
        Ok(self.entries.drain())
    }
}

impl Drop for JournalLog {
    fn drop(&mut self) {
        // Killing journalctl closes its stdout, which ends the reader thread
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Parse one `--output=json` journal entry.
fn parse_journal_line(line: &str) -> Option<JournalEntry> {
    let entry: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            debug!("Skipping unparsable journal line: {e}");
            return None;
        }
    };

    let category = match entry.get("PRIORITY").and_then(Value::as_str) {
        Some("0" | "1" | "2" | "3") => EventCategory::Error,
        Some("4") => EventCategory::Warning,
        _ => EventCategory::Information,
    };

    let lifecycle = entry
        .get("MESSAGE_ID")
        .and_then(Value::as_str)
        .is_some_and(|id| UNIT_LIFECYCLE_MESSAGE_IDS.contains(&id));

    let record = if lifecycle {
        // The service manager reports lifecycle transitions regardless of the
        // syslog priority attached to the message
        EventRecord::new(EventCategory::Information, SERVICE_STATE_CHANGED)
    } else {
        EventRecord::new(category, 0)
    };

    Some(JournalEntry {
        record,
        cursor: entry
            .get("__CURSOR")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
