//! Skiff placement — which machines may run a service, and where new
//! replicas go.
//!
//! This crate makes no resource-aware decisions. Eligibility is a plain
//! allow-list match, and new replicas are spread round-robin starting from
//! the machines that currently run the fewest containers of the service.
//!
//! # Components
//!
//! - **`eligibility`** — Resolve a `Placement` against the cluster's machines
//! - **`spread`** — Load-aware round-robin assignment of new replicas

pub mod eligibility;
pub mod error;
pub mod spread;

pub use eligibility::Eligibility;
pub use error::{PlacementError, PlacementResult};
pub use spread::{Candidate, spread};
