//! Error types for cluster access.

use thiserror::Error;

/// Result type alias for machine agent calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for snapshot reads.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors returned by a machine agent call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("machine not found: {0}")]
    MachineNotFound(String),

    #[error("container {container} not found on machine {machine}")]
    ContainerNotFound { machine: String, container: String },

    #[error("machine {0} is unreachable")]
    Unreachable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("cluster state error: {0}")]
    State(String),
}

/// Errors that make a planning snapshot unusable.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to list cluster machines: {0}")]
    ListMachines(#[source] ClientError),

    #[error("no machines found in the cluster")]
    NoMachines,

    #[error("none of the {total} cluster machine(s) could be reached: {}", .reasons.join("; "))]
    NoReachableMachines { total: usize, reasons: Vec<String> },

    #[error("snapshot cancelled")]
    Cancelled,
}
