//! skiff-core — shared types for the Skiff control plane.
//!
//! Everything the planning engine passes between crates lives here:
//! the desired service description ([`DesiredSpec`]), the observed
//! per-machine records ([`MachineInfo`], [`ContainerRecord`]), the
//! configuration fingerprint used to detect drift, and the `skiff.toml`
//! parser.

pub mod config;
pub mod fingerprint;
pub mod types;
pub mod validate;

pub use config::{ClusterConfig, DeployConfig, SkiffConfig};
pub use fingerprint::Fingerprint;
pub use types::*;
pub use validate::ValidationError;
