//! Domain types shared across Skiff crates.
//!
//! These types describe both sides of a deployment: the desired service
//! configuration supplied by the operator and the containers observed on
//! cluster machines. All of them serialize to JSON (plan output, cluster
//! state files) and TOML (service files).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Unique identifier for a machine in the cluster.
pub type MachineId = String;

/// Unique identifier for a container on a machine.
pub type ContainerId = String;

// ── Service ───────────────────────────────────────────────────────

/// How a service's containers are distributed across machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceMode {
    /// A fixed number of containers spread over eligible machines.
    #[default]
    Replicated,
    /// Exactly one container on every eligible machine.
    Global,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceMode::Replicated => f.write_str("replicated"),
            ServiceMode::Global => f.write_str("global"),
        }
    }
}

/// Protocol of a published port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Http,
    Https,
}

impl Protocol {
    /// Whether the port is routed through the reverse proxy by hostname.
    pub fn is_http(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Http => "http",
            Protocol::Https => "https",
        };
        f.write_str(s)
    }
}

/// A port exposed by a service container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port the process listens on inside the container.
    pub container_port: u16,
    /// Port exposed on the cluster load balancer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_port: Option<u16>,
    #[serde(default)]
    pub protocol: Protocol,
    /// Hostname routed to this port (http/https only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.hostname {
            write!(f, "{host}:")?;
        }
        if let Some(published) = self.published_port {
            write!(f, "{published}:")?;
        }
        write!(f, "{}/{}", self.container_port, self.protocol)
    }
}

/// The effective configuration of a single service container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Image reference, e.g. `registry.example.com/app:v2`.
    pub image: String,
    /// Command override. Empty keeps the image default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Entrypoint override. Empty keeps the image default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Volume mounts in `source:target[:ro]` form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
}

impl ContainerSpec {
    /// Create a spec that only sets the image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Content fingerprint of this configuration.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// Machines a service is allowed to run on.
///
/// Entries may be machine names or IDs. An empty list means every machine
/// in the cluster is eligible.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placement {
    pub machines: Vec<String>,
}

impl Placement {
    /// Allow-list of machine names or IDs.
    pub fn machines<I, S>(machines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            machines: machines.into_iter().map(Into::into).collect(),
        }
    }

    /// True when no allow-list is set.
    pub fn is_any(&self) -> bool {
        self.machines.is_empty()
    }

    /// Whether `machine` is allowed by this placement.
    pub fn allows(&self, machine: &MachineInfo) -> bool {
        self.is_any()
            || self
                .machines
                .iter()
                .any(|m| *m == machine.id || *m == machine.name)
    }
}

/// What the operator wants to run for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredSpec {
    pub name: String,
    #[serde(default)]
    pub mode: ServiceMode,
    /// Container count for replicated services. Ignored in global mode.
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Placement::is_any")]
    pub placement: Placement,
    pub container: ContainerSpec,
}

fn default_replicas() -> u32 {
    1
}

impl DesiredSpec {
    /// A replicated service with the given replica count.
    pub fn replicated(name: impl Into<String>, replicas: u32, container: ContainerSpec) -> Self {
        Self {
            name: name.into(),
            mode: ServiceMode::Replicated,
            replicas,
            placement: Placement::default(),
            container,
        }
    }

    /// A global service, one container per eligible machine.
    pub fn global(name: impl Into<String>, container: ContainerSpec) -> Self {
        Self {
            name: name.into(),
            mode: ServiceMode::Global,
            replicas: 0,
            placement: Placement::default(),
            container,
        }
    }

    /// Restrict the service to the given machines.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Parse a TOML service file.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let spec: DesiredSpec = toml::from_str(&content)?;
        Ok(spec)
    }
}

/// Which containers go first when a replicated service scales down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleDownPolicy {
    /// Remove the most recently created containers and keep the
    /// longest-running ones.
    #[default]
    NewestFirst,
    /// Remove the longest-running containers first.
    OldestFirst,
}

/// How a container is replaced when its configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecreateOrder {
    /// Stop and remove the old container before starting the new one.
    #[default]
    StopFirst,
    /// Start the new container first and retire the old one once it runs.
    StartFirst,
}

impl fmt::Display for RecreateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecreateOrder::StopFirst => write!(f, "stop-first"),
            RecreateOrder::StartFirst => write!(f, "start-first"),
        }
    }
}

// ── Machine ───────────────────────────────────────────────────────

/// Membership state of a machine as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    #[default]
    Up,
    Down,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            MachineState::Up => "up",
            MachineState::Down => "down",
        })
    }
}

/// A machine in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub id: MachineId,
    pub name: String,
    #[serde(default)]
    pub state: MachineState,
}

impl MachineInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: MachineState::Up,
        }
    }
}

// ── Container ─────────────────────────────────────────────────────

/// Lifecycle status of a container as reported by a machine agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Restarting)
    }

    /// Stopped but startable without recreating.
    pub fn is_stopped(&self) -> bool {
        matches!(self, ContainerStatus::Created | ContainerStatus::Exited)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
        };
        f.pad(s)
    }
}

/// A service container observed on a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: ContainerId,
    pub name: String,
    pub machine_id: MachineId,
    /// Owning service name (from the container's service label).
    pub service: String,
    pub mode: ServiceMode,
    /// Fingerprint label recorded when the container was created.
    pub fingerprint: Fingerprint,
    pub spec: ContainerSpec,
    /// Placement label recorded when the container was created.
    #[serde(default, skip_serializing_if = "Placement::is_any")]
    pub placement: Placement,
    pub status: ContainerStatus,
    /// Unix timestamp (seconds) when the container was created.
    pub created_at: u64,
}

impl ContainerRecord {
    pub fn to_ref(&self) -> ContainerRef {
        ContainerRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Identifies a container in a plan without holding its full record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: ContainerId,
    pub name: String,
}

impl ContainerRef {
    /// Abbreviated container ID for display.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// First 12 characters of an ID, or the whole ID when shorter.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
