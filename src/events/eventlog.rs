//! Windows event log as the service-control log
//!
//! The record number after the last record read is kept across reopened
//! logs. The first log starts at the end of the existing history, and each
//! read seeks straight to the first unread record.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::EventLog::{
    CloseEventLog, EVENTLOG_AUDIT_FAILURE, EVENTLOG_AUDIT_SUCCESS, EVENTLOG_ERROR_TYPE,
    EVENTLOG_FORWARDS_READ, EVENTLOG_SEEK_READ, EVENTLOG_SEQUENTIAL_READ, EVENTLOG_WARNING_TYPE,
    EVENTLOGRECORD, GetNumberOfEventLogRecords, GetOldestEventLogRecord, NotifyChangeEventLog,
    OpenEventLogW, ReadEventLogW,
};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};
use windows::core::PCWSTR;

use super::{Capability, EventCategory, EventLog, EventRecord, EventSource, Wake};
use crate::error::{Result, WatchError};

const BUFFER_SIZE: usize = 16384;

/// Home editions ship without the group policy editor and do not emit
/// service-control events to the event log.
const GROUP_POLICY_EDITOR: &str = r"C:\Windows\System32\gpedit.msc";

#[derive(Debug, Default, Clone)]
pub struct WindowsEventSource {
    /// Record number of the next unread record.
    next_record: Arc<Mutex<Option<u32>>>,
}

impl EventSource for WindowsEventSource {
    fn capability(&self) -> Capability {
        if Path::new(GROUP_POLICY_EDITOR).exists() {
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
        let wide: Vec<u16> = log_name.encode_utf16().chain(Some(0)).collect();

        let log = unsafe { OpenEventLogW(PCWSTR::null(), PCWSTR(wide.as_ptr())) }
            .map_err(|e| open_err(e.to_string()))?;
        let event = match unsafe { CreateEventW(None, false, false, PCWSTR::null()) } {
            Ok(event) => event,
            Err(e) => {
                unsafe {
                    let _ = CloseEventLog(log);
                }
                return Err(open_err(e.to_string()));
            }
        };
        // Handles are owned from here on; Drop closes them
        let opened = WindowsEventLog {
            name: log_name.to_string(),
            log,
            event,
            next_record: Arc::clone(&self.next_record),
        };
        unsafe { NotifyChangeEventLog(opened.log, opened.event) }
            .map_err(|e| open_err(e.to_string()))?;

        let mut next = position(&self.next_record);
        if next.is_none() {
            // History written before the first log is not read
            *next = Some(opened.end().map_err(|e| open_err(e.to_string()))?);
        }
        drop(next);

        Ok(Box::new(opened))
    }
}

struct WindowsEventLog {
    name: String,
    log: HANDLE,
    event: HANDLE,
    next_record: Arc<Mutex<Option<u32>>>,
}

impl WindowsEventLog {
    /// Record number the next written record will get.
    fn end(&self) -> windows::core::Result<u32> {
        let mut oldest = 0u32;
        let mut count = 0u32;
        unsafe {
            GetOldestEventLogRecord(self.log, &mut oldest)?;
            GetNumberOfEventLogRecords(self.log, &mut count)?;
        }
        Ok(log_end(oldest, count))
    }
}

fn position(next_record: &Mutex<Option<u32>>) -> MutexGuard<'_, Option<u32>> {
    next_record.lock().unwrap_or_else(PoisonError::into_inner)
}

fn log_end(oldest: u32, count: u32) -> u32 {
    oldest.saturating_add(count).max(1)
}

// Event log and event handles may be used from any thread
unsafe impl Send for WindowsEventLog {}

impl EventLog for WindowsEventLog {
    fn wait(&mut self, timeout: Duration) -> Result<Wake> {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        match unsafe { WaitForSingleObject(self.event, millis) } {
            WAIT_OBJECT_0 => Ok(Wake::Notified),
            WAIT_TIMEOUT => Ok(Wake::TimedOut),
            other => Err(WatchError::EventLog {
                log: self.name.clone(),
                reason: format!("wait failed with {:#x}", other.0),
            }),
        }
    }

    fn read_available(&mut self) -> Result<Vec<EventRecord>> {
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut records = Vec::new();
        let mut next = position(&self.next_record);
        let start = match *next {
            Some(start) => start,
            None => self.end().map_err(|e| WatchError::EventLog {
                log: self.name.clone(),
                reason: e.to_string(),
            })?,
        };
        let mut seek = Some(start);

        loop {
            let flags = match seek {
                Some(_) => EVENTLOG_SEEK_READ | EVENTLOG_FORWARDS_READ,
                None => EVENTLOG_SEQUENTIAL_READ | EVENTLOG_FORWARDS_READ,
            };
            let mut read = 0u32;
            let mut needed = 0u32;
            let ok = unsafe {
                ReadEventLogW(
                    self.log,
                    flags,
                    seek.unwrap_or(0),
                    buffer.as_mut_ptr().cast(),
                    BUFFER_SIZE as u32,
                    &mut read,
                    &mut needed,
                )
            };
            // Fails with ERROR_HANDLE_EOF once the log is drained, and the
            // seek fails when no record with that number exists yet
            if ok.is_err() || read == 0 {
                if seek.is_some() {
                    // A cleared log restarts numbering below our position
                    if let Ok(end) = self.end() {
                        *next = Some(start.min(end));
                    }
                }
                break;
            }
            seek = None;

            let mut offset = 0usize;
            while offset + std::mem::size_of::<EVENTLOGRECORD>() <= read as usize {
                let raw = unsafe {
                    std::ptr::read_unaligned(buffer.as_ptr().add(offset).cast::<EVENTLOGRECORD>())
                };
                if raw.Length == 0 {
                    break;
                }
                records.push(EventRecord::new(category_of(raw.EventType.0), raw.EventID));
                *next = Some(raw.RecordNumber.wrapping_add(1));
                offset += raw.Length as usize;
            }
        }

        Ok(records)
    }
}

impl Drop for WindowsEventLog {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.event);
            let _ = CloseEventLog(self.log);
        }
    }
}

fn category_of(event_type: u16) -> EventCategory {
    match event_type {
        t if t == EVENTLOG_ERROR_TYPE.0 => EventCategory::Error,
        t if t == EVENTLOG_WARNING_TYPE.0 => EventCategory::Warning,
        t if t == EVENTLOG_AUDIT_SUCCESS.0 => EventCategory::AuditSuccess,
        t if t == EVENTLOG_AUDIT_FAILURE.0 => EventCategory::AuditFailure,
        _ => EventCategory::Information,
    }
}
