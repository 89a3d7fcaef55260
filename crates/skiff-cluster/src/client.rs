//! Machine agent client surface.
//!
//! Every call addresses one machine. Calls are assumed idempotent enough
//! that a retry by the transport layer is safe; the engine itself never
//! retries.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use skiff_core::{
    ContainerId, ContainerRecord, ContainerSpec, Fingerprint, MachineInfo, Placement, ServiceMode,
};

use crate::error::ClientResult;

/// Restricts which machines a listing returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineFilter {
    /// Machine names or IDs. Empty matches every machine.
    pub machines: Vec<String>,
}

impl MachineFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(machines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            machines: machines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, machine: &MachineInfo) -> bool {
        self.machines.is_empty()
            || self
                .machines
                .iter()
                .any(|m| *m == machine.id || *m == machine.name)
    }
}

/// A new service container to create on a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContainerRequest {
    pub service: String,
    pub mode: ServiceMode,
    /// Recorded as a label so later snapshots can detect drift.
    pub fingerprint: Fingerprint,
    pub spec: ContainerSpec,
    /// Recorded as a label so `scale` and `restart` keep the allow-list.
    #[serde(default, skip_serializing_if = "Placement::is_any")]
    pub placement: Placement,
}

impl CreateContainerRequest {
    pub fn new(service: &str, mode: ServiceMode, spec: &ContainerSpec) -> Self {
        Self {
            service: service.to_string(),
            mode,
            fingerprint: spec.fingerprint(),
            spec: spec.clone(),
            placement: Placement::default(),
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// How to stop a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOptions {
    pub signal: String,
    /// Grace period before the agent kills the container.
    pub timeout: Duration,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            signal: "SIGTERM".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// How to remove a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove even if the container is still running.
    pub force: bool,
    /// Also remove anonymous volumes attached to the container.
    pub remove_volumes: bool,
}

/// The kinds of call a [`Client`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientCall {
    ListContainers,
    Create,
    Start,
    Stop,
    Remove,
    Inspect,
}

impl fmt::Display for ClientCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientCall::ListContainers => "list containers",
            ClientCall::Create => "create",
            ClientCall::Start => "start",
            ClientCall::Stop => "stop",
            ClientCall::Remove => "remove",
            ClientCall::Inspect => "inspect",
        };
        f.write_str(s)
    }
}

/// The capabilities the deployment engine needs from the cluster.
#[async_trait]
pub trait Client: Send + Sync {
    /// List cluster machines matching `filter`.
    async fn list_machines(&self, filter: &MachineFilter) -> ClientResult<Vec<MachineInfo>>;

    /// List containers on `machine_id` labeled with `service`.
    async fn list_service_containers(
        &self,
        machine_id: &str,
        service: &str,
    ) -> ClientResult<Vec<ContainerRecord>>;

    /// Create (but do not start) a container. Returns its ID.
    async fn create_container(
        &self,
        machine_id: &str,
        request: &CreateContainerRequest,
    ) -> ClientResult<ContainerId>;

    async fn start_container(&self, machine_id: &str, container_id: &str) -> ClientResult<()>;

    async fn stop_container(
        &self,
        machine_id: &str,
        container_id: &str,
        options: &StopOptions,
    ) -> ClientResult<()>;

    async fn remove_container(
        &self,
        machine_id: &str,
        container_id: &str,
        options: &RemoveOptions,
    ) -> ClientResult<()>;

    async fn inspect_container(
        &self,
        machine_id: &str,
        container_id: &str,
    ) -> ClientResult<ContainerRecord>;
}
