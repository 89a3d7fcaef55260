//! Atomic operations against one container slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use skiff_core::{ContainerRef, ContainerSpec, MachineId, RecreateOrder};

/// Why an existing container is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecreateReason {
    ImageChanged { from: String, to: String },
    ConfigChanged,
    /// The container is dead and cannot be restarted.
    Dead,
    Forced,
}

impl fmt::Display for RecreateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecreateReason::ImageChanged { from, to } => {
                write!(f, "image changed {from} -> {to}")
            }
            RecreateReason::ConfigChanged => write!(f, "configuration changed"),
            RecreateReason::Dead => write!(f, "container is dead"),
            RecreateReason::Forced => write!(f, "forced"),
        }
    }
}

/// Why a container is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveReason {
    ScaleDown,
    PlacementExcluded,
    /// An extra container of a global service on the same machine.
    Duplicate,
    ServiceRemoval,
}

impl fmt::Display for RemoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoveReason::ScaleDown => "scale down",
            RemoveReason::PlacementExcluded => "machine excluded by placement",
            RemoveReason::Duplicate => "duplicate on machine",
            RemoveReason::ServiceRemoval => "service removal",
        };
        f.write_str(s)
    }
}

/// One step of a plan. Each operation targets a single container slot on
/// a single machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Create {
        machine_id: MachineId,
        spec: ContainerSpec,
    },
    Recreate {
        machine_id: MachineId,
        container: ContainerRef,
        spec: ContainerSpec,
        reason: RecreateReason,
        #[serde(default)]
        order: RecreateOrder,
    },
    Remove {
        machine_id: MachineId,
        container: ContainerRef,
        reason: RemoveReason,
    },
    Start {
        machine_id: MachineId,
        container: ContainerRef,
    },
    Stop {
        machine_id: MachineId,
        container: ContainerRef,
    },
}

/// Discriminant of an [`Operation`], for grouping and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Create,
    Recreate,
    Remove,
    Start,
    Stop,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Create => "create",
            OperationKind::Recreate => "recreate",
            OperationKind::Remove => "remove",
            OperationKind::Start => "start",
            OperationKind::Stop => "stop",
        };
        f.write_str(s)
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Recreate { .. } => OperationKind::Recreate,
            Operation::Remove { .. } => OperationKind::Remove,
            Operation::Start { .. } => OperationKind::Start,
            Operation::Stop { .. } => OperationKind::Stop,
        }
    }

    pub fn machine_id(&self) -> &str {
        match self {
            Operation::Create { machine_id, .. }
            | Operation::Recreate { machine_id, .. }
            | Operation::Remove { machine_id, .. }
            | Operation::Start { machine_id, .. }
            | Operation::Stop { machine_id, .. } => machine_id,
        }
    }

    /// The existing container this operation acts on. `None` for creates.
    pub fn container(&self) -> Option<&ContainerRef> {
        match self {
            Operation::Create { .. } => None,
            Operation::Recreate { container, .. }
            | Operation::Remove { container, .. }
            | Operation::Start { container, .. }
            | Operation::Stop { container, .. } => Some(container),
        }
    }

    pub fn is_scale_down(&self) -> bool {
        matches!(
            self,
            Operation::Remove {
                reason: RemoveReason::ScaleDown,
                ..
            }
        )
    }
}
