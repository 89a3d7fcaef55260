//! Content fingerprint of a container configuration.
//!
//! The fingerprint is a SHA-256 digest over a canonical encoding of the
//! [`ContainerSpec`]. Ports and volumes are sorted first so that list order
//! in a service file never forces a recreate. Each field is tagged and
//! length-prefixed so that adjacent values cannot collide.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{ContainerSpec, short_id};

/// Hex-encoded SHA-256 of a container's effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `spec`.
    pub fn of(spec: &ContainerSpec) -> Self {
        let mut hasher = Sha256::new();

        field(&mut hasher, "image", spec.image.as_bytes());
        for arg in &spec.command {
            field(&mut hasher, "command", arg.as_bytes());
        }
        for arg in &spec.entrypoint {
            field(&mut hasher, "entrypoint", arg.as_bytes());
        }
        // BTreeMap iterates in key order.
        for (key, value) in &spec.env {
            field(&mut hasher, "env.key", key.as_bytes());
            field(&mut hasher, "env.value", value.as_bytes());
        }

        let mut volumes: Vec<&String> = spec.volumes.iter().collect();
        volumes.sort();
        for volume in volumes {
            field(&mut hasher, "volume", volume.as_bytes());
        }

        let mut ports: Vec<_> = spec.ports.iter().collect();
        ports.sort();
        for port in ports {
            field(&mut hasher, "port", port.to_string().as_bytes());
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        short_id(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn field(hasher: &mut Sha256, tag: &str, value: &[u8]) {
    hasher.update(tag.as_bytes());
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value);
}
