//! MemoryCluster — an in-process [`Client`] implementation.
//!
//! Holds machines and containers in memory and can load/save them as a
//! JSON cluster state file, which is how the `skiff` CLI runs without a
//! remote agent transport. It also carries the fault-injection and
//! instrumentation hooks the engine's tests rely on: unreachable machines,
//! per-call failures, missing images, artificial latency, in-flight call
//! peaks and a per-service history of running container counts.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use skiff_core::{
    ContainerId, ContainerRecord, ContainerSpec, ContainerStatus, MachineId, MachineInfo,
    MachineState, Placement, ServiceMode,
};

use crate::client::{
    Client, ClientCall, CreateContainerRequest, MachineFilter, RemoveOptions, StopOptions,
};
use crate::error::{ClientError, ClientResult};

/// Convert any `Display` error into a `ClientError::State`.
macro_rules! state_err {
    ($context:literal) => {
        |e| ClientError::State(format!(concat!($context, ": {}"), e))
    };
}

/// Serializable contents of a cluster state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterState {
    pub machines: Vec<MachineInfo>,
    #[serde(default)]
    pub containers: Vec<ContainerRecord>,
    /// Last creation timestamp handed out; keeps `created_at` monotonic.
    #[serde(default)]
    pub clock: u64,
    /// Sequence used to derive container IDs.
    #[serde(default)]
    pub next_seq: u64,
    /// Running container count per service after every mutation.
    #[serde(skip)]
    history: HashMap<String, Vec<usize>>,
}

impl ClusterState {
    fn machine(&self, machine_id: &str) -> ClientResult<&MachineInfo> {
        self.machines
            .iter()
            .find(|m| m.id == machine_id)
            .ok_or_else(|| ClientError::MachineNotFound(machine_id.to_string()))
    }

    fn container_mut(
        &mut self,
        machine_id: &str,
        container_id: &str,
    ) -> ClientResult<&mut ContainerRecord> {
        self.containers
            .iter_mut()
            .find(|c| c.machine_id == machine_id && c.id == container_id)
            .ok_or_else(|| ClientError::ContainerNotFound {
                machine: machine_id.to_string(),
                container: container_id.to_string(),
            })
    }

    fn running_count(&self, service: &str) -> usize {
        self.containers
            .iter()
            .filter(|c| c.service == service && c.status.is_running())
            .count()
    }

    fn record_running(&mut self, service: &str) {
        let count = self.running_count(service);
        self.history
            .entry(service.to_string())
            .or_default()
            .push(count);
    }

    fn next_container_id(&mut self, machine_id: &str, service: &str) -> ContainerId {
        self.next_seq += 1;
        let mut hasher = Sha256::new();
        hasher.update(machine_id.as_bytes());
        hasher.update(service.as_bytes());
        hasher.update(self.next_seq.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    fn tick(&mut self) -> u64 {
        self.clock = epoch_secs().max(self.clock + 1);
        self.clock
    }
}

/// Fault injection and instrumentation, never persisted.
#[derive(Debug, Default)]
struct Runtime {
    unreachable: HashSet<MachineId>,
    failures: HashMap<(MachineId, ClientCall), String>,
    list_machines_failure: Option<String>,
    missing_images: HashSet<String>,
    exit_on_start: HashSet<MachineId>,
    in_flight: usize,
    peak_in_flight: usize,
    machine_in_flight: HashMap<MachineId, usize>,
    machine_peak: HashMap<MachineId, usize>,
    calls: Vec<(ClientCall, MachineId)>,
}

/// In-memory cluster of machines and service containers.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterState>,
    runtime: Mutex<Runtime>,
    latency: Option<Duration>,
}

impl MemoryCluster {
    /// An empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cluster with the given machines and no containers.
    pub fn with_machines<I>(machines: I) -> Self
    where
        I: IntoIterator<Item = MachineInfo>,
    {
        Self::from_state(ClusterState {
            machines: machines.into_iter().collect(),
            ..Default::default()
        })
    }

    pub fn from_state(state: ClusterState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Default::default()
        }
    }

    /// Load a cluster state file.
    pub fn open(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(state_err!("read state file"))?;
        let state: ClusterState =
            serde_json::from_str(&content).map_err(state_err!("parse state file"))?;
        debug!(?path, machines = state.machines.len(), "cluster state loaded");
        Ok(Self::from_state(state))
    }

    /// Write the current cluster state to `path`.
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let json = serde_json::to_string_pretty(&*self.lock_state())
            .map_err(state_err!("serialize state"))?;
        std::fs::write(path, json).map_err(state_err!("write state file"))?;
        debug!(?path, "cluster state saved");
        Ok(())
    }

    /// Delay every call by `latency` (simulates network round trips).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// A copy of the current cluster state.
    pub fn state(&self) -> ClusterState {
        self.lock_state().clone()
    }

    pub fn add_machine(&self, machine: MachineInfo) {
        self.lock_state().machines.push(machine);
    }

    /// Remove a machine and every container on it from the cluster.
    pub fn remove_machine(&self, machine_id: &str) {
        let mut state = self.lock_state();
        state.machines.retain(|m| m.id != machine_id);
        state.containers.retain(|c| c.machine_id != machine_id);
    }

    pub fn set_machine_state(&self, machine_id: &str, machine_state: MachineState) {
        let mut state = self.lock_state();
        if let Some(m) = state.machines.iter_mut().find(|m| m.id == machine_id) {
            m.state = machine_state;
        }
    }

    /// Make every call addressed to `machine_id` fail as unreachable.
    pub fn set_reachable(&self, machine_id: &str, reachable: bool) {
        let mut rt = self.lock_runtime();
        if reachable {
            rt.unreachable.remove(machine_id);
        } else {
            rt.unreachable.insert(machine_id.to_string());
        }
    }

    /// Fail every `call` on `machine_id` with an RPC error.
    pub fn fail(&self, machine_id: &str, call: ClientCall, message: &str) {
        self.lock_runtime()
            .failures
            .insert((machine_id.to_string(), call), message.to_string());
    }

    pub fn fail_list_machines(&self, message: &str) {
        self.lock_runtime().list_machines_failure = Some(message.to_string());
    }

    /// Containers started on `machine_id` exit immediately.
    pub fn fail_to_run(&self, machine_id: &str) {
        self.lock_runtime()
            .exit_on_start
            .insert(machine_id.to_string());
    }

    pub fn clear_failures(&self) {
        let mut rt = self.lock_runtime();
        rt.failures.clear();
        rt.list_machines_failure = None;
        rt.exit_on_start.clear();
    }

    /// Make creates of `image` fail as if the image could not be pulled.
    pub fn mark_image_missing(&self, image: &str) {
        self.lock_runtime().missing_images.insert(image.to_string());
    }

    /// Place an existing container directly into the cluster.
    pub fn seed_container(
        &self,
        machine_id: &str,
        service: &str,
        spec: &ContainerSpec,
        status: ContainerStatus,
        created_at: u64,
    ) -> ContainerId {
        self.seed_container_with_mode(
            machine_id,
            service,
            ServiceMode::Replicated,
            spec,
            status,
            created_at,
        )
    }

    pub fn seed_container_with_mode(
        &self,
        machine_id: &str,
        service: &str,
        mode: ServiceMode,
        spec: &ContainerSpec,
        status: ContainerStatus,
        created_at: u64,
    ) -> ContainerId {
        let mut state = self.lock_state();
        let id = state.next_container_id(machine_id, service);
        state.clock = state.clock.max(created_at);
        state.containers.push(ContainerRecord {
            name: container_name(service, &id),
            id: id.clone(),
            machine_id: machine_id.to_string(),
            service: service.to_string(),
            mode,
            fingerprint: spec.fingerprint(),
            spec: spec.clone(),
            placement: Placement::default(),
            status,
            created_at,
        });
        id
    }

    /// Every container of `service`, in creation order.
    pub fn containers(&self, service: &str) -> Vec<ContainerRecord> {
        let mut containers: Vec<_> = self
            .lock_state()
            .containers
            .iter()
            .filter(|c| c.service == service)
            .cloned()
            .collect();
        containers.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        containers
    }

    /// Running container count of `service` after each mutating call.
    pub fn running_history(&self, service: &str) -> Vec<usize> {
        self.lock_state()
            .history
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.lock_runtime().peak_in_flight
    }

    /// Highest number of calls observed in flight at once on one machine.
    pub fn peak_in_flight_on(&self, machine_id: &str) -> usize {
        self.lock_runtime()
            .machine_peak
            .get(machine_id)
            .copied()
            .unwrap_or(0)
    }

    /// Every call received, in arrival order.
    pub fn calls(&self) -> Vec<(ClientCall, MachineId)> {
        self.lock_runtime().calls.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a call: apply faults and count it in flight.
    fn enter(&self, call: ClientCall, machine_id: &str) -> ClientResult<InFlight<'_>> {
        let down = self
            .lock_state()
            .machines
            .iter()
            .any(|m| m.id == machine_id && m.state == MachineState::Down);

        let mut rt = self.lock_runtime();
        rt.calls.push((call, machine_id.to_string()));
        if down || rt.unreachable.contains(machine_id) {
            return Err(ClientError::Unreachable(machine_id.to_string()));
        }
        if let Some(message) = rt.failures.get(&(machine_id.to_string(), call)) {
            return Err(ClientError::Rpc(message.clone()));
        }

        rt.in_flight += 1;
        rt.peak_in_flight = rt.peak_in_flight.max(rt.in_flight);
        let on_machine = rt
            .machine_in_flight
            .entry(machine_id.to_string())
            .or_insert(0);
        *on_machine += 1;
        let current = *on_machine;
        let peak = rt.machine_peak.entry(machine_id.to_string()).or_insert(0);
        *peak = (*peak).max(current);

        Ok(InFlight {
            cluster: self,
            machine_id: machine_id.to_string(),
        })
    }

    async fn call<T, F>(&self, call: ClientCall, machine_id: &str, f: F) -> ClientResult<T>
    where
        F: FnOnce(&mut ClusterState) -> ClientResult<T> + Send,
    {
        let _in_flight = self.enter(call, machine_id)?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.lock_state();
        state.machine(machine_id)?;
        f(&mut state)
    }
}

/// Decrements the in-flight counters when a call completes.
struct InFlight<'a> {
    cluster: &'a MemoryCluster,
    machine_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut rt = self.cluster.lock_runtime();
        rt.in_flight = rt.in_flight.saturating_sub(1);
        if let Some(n) = rt.machine_in_flight.get_mut(&self.machine_id) {
            *n = n.saturating_sub(1);
        }
    }
}

#[async_trait]
impl Client for MemoryCluster {
    async fn list_machines(&self, filter: &MachineFilter) -> ClientResult<Vec<MachineInfo>> {
        if let Some(message) = self.lock_runtime().list_machines_failure.clone() {
            return Err(ClientError::Rpc(message));
        }
        Ok(self
            .lock_state()
            .machines
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn list_service_containers(
        &self,
        machine_id: &str,
        service: &str,
    ) -> ClientResult<Vec<ContainerRecord>> {
        self.call(ClientCall::ListContainers, machine_id, |state| {
            Ok(state
                .containers
                .iter()
                .filter(|c| c.machine_id == machine_id && c.service == service)
                .cloned()
                .collect())
        })
        .await
    }

    async fn create_container(
        &self,
        machine_id: &str,
        request: &CreateContainerRequest,
    ) -> ClientResult<ContainerId> {
        if self
            .lock_runtime()
            .missing_images
            .contains(&request.spec.image)
        {
            return Err(ClientError::ImageNotFound(request.spec.image.clone()));
        }
        self.call(ClientCall::Create, machine_id, |state| {
            let id = state.next_container_id(machine_id, &request.service);
            let created_at = state.tick();
            state.containers.push(ContainerRecord {
                name: container_name(&request.service, &id),
                id: id.clone(),
                machine_id: machine_id.to_string(),
                service: request.service.clone(),
                mode: request.mode,
                fingerprint: request.fingerprint.clone(),
                spec: request.spec.clone(),
                placement: request.placement.clone(),
                status: ContainerStatus::Created,
                created_at,
            });
            state.record_running(&request.service);
            debug!(machine = %machine_id, container = %id, service = %request.service, "container created");
            Ok(id)
        })
        .await
    }

    async fn start_container(&self, machine_id: &str, container_id: &str) -> ClientResult<()> {
        let status = if self.lock_runtime().exit_on_start.contains(machine_id) {
            ContainerStatus::Exited
        } else {
            ContainerStatus::Running
        };
        self.call(ClientCall::Start, machine_id, |state| {
            let container = state.container_mut(machine_id, container_id)?;
            container.status = status;
            let service = container.service.clone();
            state.record_running(&service);
            Ok(())
        })
        .await
    }

    async fn stop_container(
        &self,
        machine_id: &str,
        container_id: &str,
        _options: &StopOptions,
    ) -> ClientResult<()> {
        self.call(ClientCall::Stop, machine_id, |state| {
            let container = state.container_mut(machine_id, container_id)?;
            if container.status.is_running() || container.status == ContainerStatus::Paused {
                container.status = ContainerStatus::Exited;
            }
            let service = container.service.clone();
            state.record_running(&service);
            Ok(())
        })
        .await
    }

    async fn remove_container(
        &self,
        machine_id: &str,
        container_id: &str,
        options: &RemoveOptions,
    ) -> ClientResult<()> {
        self.call(ClientCall::Remove, machine_id, |state| {
            let container = state.container_mut(machine_id, container_id)?;
            if container.status.is_running() && !options.force {
                return Err(ClientError::Conflict(format!(
                    "container {container_id} is running; stop it first"
                )));
            }
            let service = container.service.clone();
            state
                .containers
                .retain(|c| !(c.machine_id == machine_id && c.id == container_id));
            state.record_running(&service);
            Ok(())
        })
        .await
    }

    async fn inspect_container(
        &self,
        machine_id: &str,
        container_id: &str,
    ) -> ClientResult<ContainerRecord> {
        self.call(ClientCall::Inspect, machine_id, |state| {
            state.container_mut(machine_id, container_id).map(|c| c.clone())
        })
        .await
    }
}

fn container_name(service: &str, id: &str) -> String {
    format!("{service}-{}", &id[..id.len().min(4)])
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
