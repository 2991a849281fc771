//! Service status: which supervised processes belong to a group, and how they are doing.
//!
//! Providers hand out snapshots. A returned `Vec<Service>` never changes
//! after the call, whatever happens to the processes afterwards.

#[cfg(test)]
pub mod fakes;
mod monit;

use serde::Serialize;

pub use monit::MonitStatus;

/// Health of a single supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Running,
    Failing,
    Starting,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,

    /// Whether the supervisor is currently watching this service.
    pub monitored: bool,

    pub status: ServiceStatus,
}

impl Service {
    pub fn is_running(&self) -> bool {
        self.monitored && self.status == ServiceStatus::Running
    }
}

/// Answers "what is running in this group?".
pub trait StatusProvider {
    /// Services in `group`, in the group's declared order.
    ///
    /// An unknown or empty group yields an empty list, not an error.
    fn services_in_group(&self, group: &str) -> Vec<Service>;
}
