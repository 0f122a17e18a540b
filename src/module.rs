//! Scheduled-check plumbing shared by every agent module.

use serde::Serialize;

/// Kind tag reported for service modules.
pub const SERVICE_MODULE_KIND: &str = "generic_proc";

/// Gates a module so it only executes every `interval` agent cycles.
///
/// The first call always runs.
#[derive(Debug, Clone)]
pub struct IntervalGate {
    interval: u32,
    executions: u32,
}

impl IntervalGate {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            executions: 0,
        }
    }

    /// Count one agent cycle; true when the module is due this cycle.
    pub fn fulfilled(&mut self) -> bool {
        let due = self.executions % self.interval == 0;
        self.executions = self.executions.wrapping_add(1);
        due
    }
}

/// Snapshot of a module's current output, as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    pub name: String,
    pub kind: &'static str,
    pub data: String,
}
