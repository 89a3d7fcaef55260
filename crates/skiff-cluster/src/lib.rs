//! skiff-cluster — access to cluster machines for the deployment engine.
//!
//! The engine never talks to machine agents directly. It goes through the
//! narrow [`Client`] capability surface defined here, and observes the
//! cluster through an [`ActualState`] snapshot taken fresh at the start of
//! every planning cycle.
//!
//! # Components
//!
//! - **`client`** — The `Client` trait and its request/option types
//! - **`memory`** — `MemoryCluster`, an in-process `Client` backed by a JSON state file
//! - **`snapshot`** — State Snapshot Reader (parallel per-machine fan-out)
//!
//! ```text
//! fetch(service)
//!   ├── list_machines(filter)
//!   └── per machine (concurrently)
//!       ├── down in membership → Unreachable
//!       ├── list_service_containers() ok → Reachable(containers)
//!       └── list_service_containers() err → Unreachable(reason)
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod snapshot;

pub use client::{
    Client, ClientCall, CreateContainerRequest, MachineFilter, RemoveOptions, StopOptions,
};
pub use error::{ClientError, ClientResult, SnapshotError, SnapshotResult};
pub use memory::{ClusterState, MemoryCluster};
pub use snapshot::{ActualState, MachineView, Reachability, fetch};
