//! Monit status snapshots.
//!
//! A status document mirrors what monit reports about its services,
//! using monit's own numeric fields, plus the service groups declared
//! in its control files:
//!
//! ```json
//! {
//!   "services": [{ "name": "nats", "status": 0, "monitor": 1 }],
//!   "groups": { "vcap": ["nats"] }
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use serde::Deserialize;

use super::{Service, ServiceStatus, StatusProvider};

// Values of monit's `monitor` field.
const NOT_MONITORED: u32 = 0;
const INITIALIZING: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum MonitError {
    #[error("failed to read monit status {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid monit status document")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    #[serde(default)]
    services: Vec<ServiceEntry>,
    #[serde(default)]
    groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    name: String,
    /// Zero when healthy; otherwise a bitmask of failed checks.
    status: u32,
    monitor: u32,
}

impl ServiceEntry {
    fn to_service(&self) -> Service {
        let status = match (self.monitor, self.status) {
            (NOT_MONITORED, _) => ServiceStatus::Unknown,
            (INITIALIZING, _) => ServiceStatus::Starting,
            (_, 0) => ServiceStatus::Running,
            _ => ServiceStatus::Failing,
        };
        Service {
            name: self.name.clone(),
            monitored: self.monitor != NOT_MONITORED,
            status,
        }
    }
}

/// Services and groups as monit reported them at one moment.
#[derive(Debug, Clone, Default)]
pub struct MonitStatus {
    services: HashMap<String, Service>,
    groups: BTreeMap<String, Vec<String>>,
}

impl MonitStatus {
    /// Parse a status document.
    pub fn from_reader(reader: impl Read) -> Result<Self, MonitError> {
        let document: StatusDocument = serde_json::from_reader(reader)?;
        let services = document
            .services
            .iter()
            .map(|entry| (entry.name.clone(), entry.to_service()))
            .collect();
        Ok(Self {
            services,
            groups: document.groups,
        })
    }

    /// Load a status document from disk.
    pub fn load(path: &Path) -> Result<Self, MonitError> {
        let file = File::open(path).map_err(|source| MonitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl StatusProvider for MonitStatus {
    fn services_in_group(&self, group: &str) -> Vec<Service> {
        let Some(members) = self.groups.get(group) else {
            return Vec::new();
        };
        // Members monit no longer reports are skipped.
        members
            .iter()
            .filter_map(|name| self.services.get(name).cloned())
            .collect()
    }
}
