//! Test doubles for status providers.

use super::{Service, StatusProvider};

/// Returns the same services for every group, whatever name is asked for.
#[derive(Debug, Clone, Default)]
pub struct FakeMonitStatus {
    pub services: Vec<Service>,
}

impl StatusProvider for FakeMonitStatus {
    fn services_in_group(&self, _group: &str) -> Vec<Service> {
        self.services.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::monitor::ServiceStatus;

    fn services() -> Vec<Service> {
        vec![
            Service {
                name: "nats".into(),
                monitored: true,
                status: ServiceStatus::Running,
            },
            Service {
                name: "director".into(),
                monitored: true,
                status: ServiceStatus::Failing,
            },
        ]
    }

    #[test]
    fn ignores_group_name() {
        let fake = FakeMonitStatus {
            services: services(),
        };

        assert_eq!(fake.services_in_group("vcap"), services());
        assert_eq!(fake.services_in_group(""), services());
        assert_eq!(fake.services_in_group("no-such-group"), services());
    }

    #[test]
    fn empty_by_default() {
        assert!(FakeMonitStatus::default().services_in_group("vcap").is_empty());
    }
}
