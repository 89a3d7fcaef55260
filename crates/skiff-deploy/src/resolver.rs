//! Name resolution for plan display.
//!
//! Plans carry machine and container IDs. A [`NameResolver`] turns them
//! back into names for humans; rendering falls back to the raw ID when a
//! resolver has no answer.

use std::collections::HashMap;

use skiff_cluster::ActualState;

/// Maps identifiers in a plan to display names.
pub trait NameResolver {
    fn machine_name(&self, machine_id: &str) -> Option<&str>;
    fn container_name(&self, container_id: &str) -> Option<&str>;
}

impl NameResolver for ActualState {
    fn machine_name(&self, machine_id: &str) -> Option<&str> {
        self.machine(machine_id).map(|v| v.machine.name.as_str())
    }

    fn container_name(&self, container_id: &str) -> Option<&str> {
        self.container(container_id).map(|c| c.name.as_str())
    }
}

/// A fixed set of names collected by the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticNames {
    machines: HashMap<String, String>,
    containers: HashMap<String, String>,
}

impl StaticNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_machine(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.machines.insert(id.into(), name.into());
        self
    }

    pub fn with_container(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.containers.insert(id.into(), name.into());
        self
    }
}

impl NameResolver for StaticNames {
    fn machine_name(&self, machine_id: &str) -> Option<&str> {
        self.machines.get(machine_id).map(String::as_str)
    }

    fn container_name(&self, container_id: &str) -> Option<&str> {
        self.containers.get(container_id).map(String::as_str)
    }
}
