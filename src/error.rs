//! Error taxonomy shared by the watcher library.

use std::path::PathBuf;

/// Errors surfaced by watcher collaborators.
///
/// None of these escape the background loop: the loop logs them and either
/// keeps going or exits, depending on where they happen.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("service control failed for '{service}': {reason}")]
    Control { service: String, reason: String },

    #[error("could not open event log '{log}': {reason}")]
    OpenLog { log: String, reason: String },

    #[error("event log '{log}' failed: {reason}")]
    EventLog { log: String, reason: String },

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, WatchError>;
