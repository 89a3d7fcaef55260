//! State Snapshot Reader — the observed state of one service.
//!
//! A snapshot is taken fresh at the start of every planning cycle and is
//! never mutated afterwards. Machines that cannot be queried are recorded
//! as [`Reachability::Unreachable`], never as empty: a machine that is
//! merely unreachable may still run containers, and treating it as empty
//! would schedule duplicates once it comes back.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skiff_core::{ContainerRecord, MachineInfo, MachineState};

use crate::client::{Client, MachineFilter};
use crate::error::{SnapshotError, SnapshotResult};

/// What is known about one machine's containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    /// The machine answered. The list may be empty.
    Reachable(Vec<ContainerRecord>),
    /// The machine could not be queried; its containers are unknown.
    Unreachable { reason: String },
}

/// One machine in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineView {
    pub machine: MachineInfo,
    pub containers: Reachability,
}

impl MachineView {
    pub fn is_reachable(&self) -> bool {
        matches!(self.containers, Reachability::Reachable(_))
    }

    /// Known containers; `None` when the machine is unreachable.
    pub fn known_containers(&self) -> Option<&[ContainerRecord]> {
        match &self.containers {
            Reachability::Reachable(containers) => Some(containers),
            Reachability::Unreachable { .. } => None,
        }
    }
}

/// Observed containers of one service across the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActualState {
    pub service: String,
    /// Every listed machine, ordered by name then ID.
    pub machines: Vec<MachineView>,
}

impl ActualState {
    /// Build a snapshot from per-machine views.
    ///
    /// Views are ordered by machine name and containers by creation time,
    /// so planning over a snapshot is deterministic.
    pub fn new(service: impl Into<String>, mut machines: Vec<MachineView>) -> Self {
        machines.sort_by(|a, b| {
            (&a.machine.name, &a.machine.id).cmp(&(&b.machine.name, &b.machine.id))
        });
        for view in &mut machines {
            if let Reachability::Reachable(containers) = &mut view.containers {
                containers.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
            }
        }
        Self {
            service: service.into(),
            machines,
        }
    }

    pub fn machine(&self, machine_id: &str) -> Option<&MachineView> {
        self.machines.iter().find(|v| v.machine.id == machine_id)
    }

    pub fn is_reachable(&self, machine_id: &str) -> bool {
        self.machine(machine_id).is_some_and(MachineView::is_reachable)
    }

    /// Every container on reachable machines.
    pub fn containers(&self) -> impl Iterator<Item = &ContainerRecord> {
        self.machines
            .iter()
            .filter_map(MachineView::known_containers)
            .flatten()
    }

    pub fn container(&self, container_id: &str) -> Option<&ContainerRecord> {
        self.containers().find(|c| c.id == container_id)
    }

    pub fn container_count(&self) -> usize {
        self.containers().count()
    }

    pub fn unreachable(&self) -> impl Iterator<Item = &MachineView> {
        self.machines.iter().filter(|v| !v.is_reachable())
    }

    pub fn reachable_count(&self) -> usize {
        self.machines.iter().filter(|v| v.is_reachable()).count()
    }
}

/// Take a snapshot of `service` across the machines matching `filter`.
///
/// Machines are queried concurrently. Individual machine failures are
/// recorded in the snapshot; the whole fetch fails only when the machine
/// listing fails, the cluster is empty, or no machine could be reached.
pub async fn fetch(
    client: &dyn Client,
    service: &str,
    filter: &MachineFilter,
    cancel: &CancellationToken,
) -> SnapshotResult<ActualState> {
    let machines = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SnapshotError::Cancelled),
        result = client.list_machines(filter) => result.map_err(SnapshotError::ListMachines)?,
    };
    if machines.is_empty() {
        return Err(SnapshotError::NoMachines);
    }

    let queries = machines.into_iter().map(|machine| async move {
        if machine.state == MachineState::Down {
            debug!(machine = %machine.name, "machine is down; containers unknown");
            return MachineView {
                machine,
                containers: Reachability::Unreachable {
                    reason: "machine is down".to_string(),
                },
            };
        }

        match client.list_service_containers(&machine.id, service).await {
            Ok(containers) => {
                let containers = normalize(containers, &machine, service);
                debug!(machine = %machine.name, count = containers.len(), "listed service containers");
                MachineView {
                    machine,
                    containers: Reachability::Reachable(containers),
                }
            }
            Err(e) => {
                warn!(machine = %machine.name, error = %e, "machine unreachable during snapshot");
                MachineView {
                    machine,
                    containers: Reachability::Unreachable {
                        reason: e.to_string(),
                    },
                }
            }
        }
    });

    let views = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SnapshotError::Cancelled),
        views = join_all(queries) => views,
    };

    let state = ActualState::new(service, views);
    if state.reachable_count() == 0 {
        let reasons = state
            .machines
            .iter()
            .filter_map(|v| match &v.containers {
                Reachability::Unreachable { reason } => {
                    Some(format!("{}: {reason}", v.machine.name))
                }
                Reachability::Reachable(_) => None,
            })
            .collect();
        return Err(SnapshotError::NoReachableMachines {
            total: state.machines.len(),
            reasons,
        });
    }

    info!(
        service,
        machines = state.machines.len(),
        unreachable = state.machines.len() - state.reachable_count(),
        containers = state.container_count(),
        "cluster snapshot taken"
    );
    Ok(state)
}

/// Keep only records of `service` and pin them to the machine that reported them.
fn normalize(
    containers: Vec<ContainerRecord>,
    machine: &MachineInfo,
    service: &str,
) -> Vec<ContainerRecord> {
    containers
        .into_iter()
        .filter(|c| c.service == service)
        .map(|mut c| {
            c.machine_id = machine.id.clone();
            c
        })
        .collect()
}
