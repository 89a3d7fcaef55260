//! Deployment error types.

use std::fmt;

use thiserror::Error;

use skiff_cluster::{ClientCall, ClientError, SnapshotError};
use skiff_core::{ContainerStatus, ValidationError};
use skiff_placement::PlacementError;

use crate::executor::ExecutionReport;

/// Errors that stop a deployment from being planned or completed.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error("no reachable eligible machine to place {missing} replica(s) of service '{service}'")]
    NoCapacity { service: String, missing: usize },

    #[error("service '{0}' has no containers in the cluster")]
    ServiceNotFound(String),

    #[error(transparent)]
    Execution(#[from] ExecutionFailure),
}

pub type DeployResult<T> = Result<T, DeployError>;

/// Why a single operation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("{step} call failed: {source}")]
    Remote {
        step: ClientCall,
        #[source]
        source: ClientError,
    },

    #[error("container {container} is {status} after start, expected running")]
    NotRunning {
        container: String,
        status: ContainerStatus,
    },

    #[error("earlier failure: {cause}")]
    Skipped { cause: String },

    #[error("cancelled")]
    Cancelled,
}

impl OperationError {
    pub(crate) fn remote(step: ClientCall) -> impl FnOnce(ClientError) -> Self {
        move |source| OperationError::Remote { step, source }
    }
}

/// A plan that did not run to completion. Carries the full report.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub report: ExecutionReport,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let problems = self.report.problems();
        write!(
            f,
            "deployment of service '{}' incomplete: {} of {} operation(s) did not succeed",
            self.report.service,
            problems.len(),
            self.report.outcomes.len()
        )?;
        for outcome in problems {
            write!(f, "\n  - {}", outcome.describe())?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionFailure {}
