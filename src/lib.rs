//! Service state watcher.
//!
//! Watches operating-system services and reports every running/stopped
//! transition once, optionally restarting services that stop.

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod manager;
pub mod module;
pub mod transport;
pub mod watcher;

pub use error::{Result, WatchError};
pub use watcher::{CheckOutcome, DetectionMode, LoopExit, ServiceWatcher, WatchContext};
