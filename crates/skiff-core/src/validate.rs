//! Service spec validation.
//!
//! Runs before any remote call is made. Every problem is collected so the
//! operator can fix the service file in one pass.

use std::collections::HashSet;

use thiserror::Error;

use crate::types::{ContainerSpec, DesiredSpec, ServiceMode};

const MAX_NAME_LEN: usize = 63;

/// A desired spec that cannot be deployed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid service spec: {}", .problems.join("; "))]
pub struct ValidationError {
    pub problems: Vec<String>,
}

impl DesiredSpec {
    /// Collect every problem that makes this service undeployable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut problems = Vec::new();

        validate_name(&self.name, &mut problems);

        if self.mode == ServiceMode::Replicated && self.replicas == 0 {
            problems.push(
                "replicas must be at least 1; remove the service to stop all replicas".to_string(),
            );
        }

        let mut seen = HashSet::new();
        for machine in &self.placement.machines {
            if machine.trim().is_empty() {
                problems.push("placement contains an empty machine name".to_string());
            } else if !seen.insert(machine.as_str()) {
                problems.push(format!("placement lists machine '{machine}' more than once"));
            }
        }

        validate_container(&self.container, &mut problems);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { problems })
        }
    }
}

fn validate_name(name: &str, problems: &mut Vec<String>) {
    if name.is_empty() {
        problems.push("service name is empty".to_string());
        return;
    }
    if name.len() > MAX_NAME_LEN {
        problems.push(format!(
            "service name '{name}' is longer than {MAX_NAME_LEN} characters"
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        problems.push(format!(
            "service name '{name}' may only contain lowercase letters, digits and '-'"
        ));
    }
    if name.starts_with('-') {
        problems.push(format!("service name '{name}' must start with a letter or digit"));
    }
}

fn validate_container(spec: &ContainerSpec, problems: &mut Vec<String>) {
    if spec.image.trim().is_empty() {
        problems.push("container image is empty".to_string());
    }

    let mut published = HashSet::new();
    let mut hostnames = HashSet::new();
    for port in &spec.ports {
        if port.container_port == 0 {
            problems.push("container port must be non-zero".to_string());
        }
        if port.hostname.is_some() && !port.protocol.is_http() {
            problems.push(format!(
                "port {port}: hostname is only supported for http and https"
            ));
        }
        if let Some(host) = &port.hostname {
            if !hostnames.insert((host.as_str(), port.protocol)) {
                problems.push(format!("hostname '{host}' is published more than once"));
            }
        }
        if let Some(p) = port.published_port {
            if p == 0 {
                problems.push(format!("port {port}: published port must be non-zero"));
            } else if !published.insert((p, port.protocol)) {
                problems.push(format!(
                    "published port {p}/{} is used more than once",
                    port.protocol
                ));
            }
        }
    }

    for volume in &spec.volumes {
        let mut parts = volume.split(':');
        let source = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default();
        let mode = parts.next();
        if source.is_empty() || !target.starts_with('/') {
            problems.push(format!(
                "volume '{volume}' must have the form source:/absolute/target[:ro]"
            ));
        } else if mode.is_some_and(|m| m != "ro" && m != "rw") || parts.next().is_some() {
            problems.push(format!("volume '{volume}' has an unknown mode"));
        }
    }
}
