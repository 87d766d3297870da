// Defines the core data structures for the application.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Services that have a settings screen behind `services/{name}/edit`.
pub const CONFIGURABLE_SERVICES: [&str; 10] = [
    "nis",
    "ntpd",
    "active-directory",
    "ldap",
    "snmpd",
    "docker",
    "smartd",
    "smb",
    "nut",
    "replication",
];

pub const ACTIVE_DIRECTORY: &str = "active-directory";

pub const ACTIVE_DIRECTORY_NOTE: &str = "By turning this service on, the system will attempt to join \
Active Directory domain using the credentials provided during configuration. If configuration is \
modified, make sure to stop and start it again.";

pub fn is_configurable(name: &str) -> bool {
    CONFIGURABLE_SERVICES.contains(&name)
}

/// A system daemon managed by the appliance's service manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub status: bool, // true while running
}

impl Service {
    pub fn new(name: &str, display_name: &str, status: bool) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            status,
        }
    }

    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// One entry of a `services:get_services` push message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusDescriptor {
    #[serde(default)]
    pub running: Option<Value>,
}

impl StatusDescriptor {
    #[cfg(test)]
    pub fn running(value: i64) -> Self {
        Self {
            running: Some(Value::from(value)),
        }
    }

    /// `None` when the descriptor carries no numeric `running` field.
    pub fn is_running(&self) -> Option<bool> {
        self.running.as_ref().and_then(Value::as_f64).map(|n| n > 0.0)
    }
}

pub type StatusBatch = HashMap<String, StatusDescriptor>;

/// Services in server order, with a name index for push lookups.
#[derive(Debug, Clone, Default)]
pub struct ServiceCollection {
    services: Vec<Service>,
    index: HashMap<String, usize>,
}

impl ServiceCollection {
    /// Builds the collection; a repeated name keeps its first occurrence.
    pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
        let mut collection = Self::default();
        for service in services {
            if collection.index.contains_key(&service.name) {
                tracing::debug!(service = %service.name, "dropping duplicate service entry");
                continue;
            }
            collection
                .index
                .insert(service.name.clone(), collection.services.len());
            collection.services.push(service);
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.index.get(name).map(|&i| &self.services[i])
    }

    /// Returns false when no service has that name.
    pub fn set_status(&mut self, name: &str, running: bool) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.services[i].status = running;
                true
            }
            None => false,
        }
    }

    /// Applies a push batch and returns how many services it matched.
    pub fn apply_batch(&mut self, batch: &StatusBatch) -> usize {
        let mut matched = 0;
        for (name, descriptor) in batch {
            let Some(running) = descriptor.is_running() else {
                continue;
            };
            if self.set_status(name, running) {
                matched += 1;
            }
        }
        matched
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            ServiceAction::Start => "started",
            ServiceAction::Stop => "stopped",
            ServiceAction::Restart => "restarted",
        }
    }
}

/// Per-row indicator next to the status switch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowStatus {
    #[default]
    Idle,
    Loading,
    Error(String),
}
