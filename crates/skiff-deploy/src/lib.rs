//! skiff-deploy — the service deployment planning and execution engine.
//!
//! Given a desired service spec and the cluster's observed state, the
//! engine computes a minimal, ordered plan of container operations and
//! executes it against the machine agents with bounded concurrency.
//!
//! # Components
//!
//! - **`differ`** — Desired vs. actual comparison, one operation per slot
//! - **`strategy`** — Rolling and force-recreate arrangement into stages
//! - **`plan`** / **`operation`** — Plan values, dry-run formatting, JSON
//! - **`executor`** — Stage-by-stage execution with per-operation outcomes
//! - **`resolver`** — ID-to-name lookup for plan display
//! - **`deployment`** — The engine entry point and lifecycle flows
//!
//! ```text
//! Deployment::plan()
//!   ├── DesiredSpec::validate()
//!   ├── skiff_cluster::fetch()      → ActualState
//!   ├── differ::diff()              → Vec<Operation>
//!   └── Strategy::arrange()         → Plan
//! Plan::execute()
//!   └── Executor::run()             → ExecutionReport
//! ```

pub mod deployment;
pub mod differ;
pub mod error;
pub mod executor;
pub mod operation;
pub mod plan;
pub mod resolver;
pub mod strategy;

pub use deployment::{
    Deployment, PlannedDeployment, desired_from_state, plan_removal, plan_start, plan_stop,
    snapshot,
};
pub use differ::{DiffOptions, diff};
pub use error::{DeployError, DeployResult, ExecutionFailure, OperationError};
pub use executor::{ExecutionReport, Executor, ExecutorConfig, OperationOutcome, OperationState};
pub use operation::{Operation, OperationKind, RecreateReason, RemoveReason};
pub use plan::{Plan, Stage, StageKind};
pub use resolver::{NameResolver, StaticNames};
pub use strategy::{ForceRecreateStrategy, RollingStrategy, Strategy};
