//! Placement error types.

use thiserror::Error;

/// Result type alias for placement decisions.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// A placement that cannot be satisfied by the current cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("placement for service '{service}' refers to unknown machine(s): {}", .machines.join(", "))]
    UnknownMachines {
        service: String,
        machines: Vec<String>,
    },

    #[error("no machine in the cluster is eligible to run service '{0}'")]
    NoEligibleMachines(String),
}
