//! Spec Differ — computes the operations that converge a service.
//!
//! The differ compares a [`DesiredSpec`] against an [`ActualState`]
//! snapshot and emits one operation per container slot that needs to
//! change. It does not order operations for availability; that is the
//! strategy's job.
//!
//! No operation ever targets an unreachable machine. Containers there are
//! unknown, so they are neither counted nor touched.

use tracing::{debug, warn};

use skiff_cluster::{ActualState, MachineView};
use skiff_core::{
    ContainerRecord, ContainerStatus, DesiredSpec, Fingerprint, RecreateOrder, ScaleDownPolicy,
    ServiceMode, short_id,
};
use skiff_placement::{Candidate, Eligibility, spread};

use crate::error::{DeployError, DeployResult};
use crate::operation::{Operation, RecreateReason, RemoveReason};

/// Knobs that change how drift is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Treat every surviving container as out of date.
    pub force_recreate: bool,
    pub scale_down_policy: ScaleDownPolicy,
}

/// Compute the operations converging `actual` to `desired`.
pub fn diff(
    desired: &DesiredSpec,
    actual: &ActualState,
    options: &DiffOptions,
) -> DeployResult<Vec<Operation>> {
    let eligibility = Eligibility::resolve(
        &desired.name,
        &desired.placement,
        actual.machines.iter().map(|v| &v.machine),
    )?;

    for view in actual.unreachable() {
        if eligibility.contains(&view.machine.id) {
            warn!(
                service = %desired.name,
                machine = %view.machine.name,
                "machine unreachable; its containers are left out of this plan"
            );
        }
    }

    let target = desired.container.fingerprint();
    let mut differ = Differ {
        desired,
        target: &target,
        options,
        ops: Vec::new(),
    };
    match desired.mode {
        ServiceMode::Global => differ.global(actual, &eligibility),
        ServiceMode::Replicated => differ.replicated(actual, &eligibility)?,
    }

    debug!(service = %desired.name, operations = differ.ops.len(), "diff computed");
    Ok(differ.ops)
}

struct Differ<'a> {
    desired: &'a DesiredSpec,
    target: &'a Fingerprint,
    options: &'a DiffOptions,
    ops: Vec<Operation>,
}

impl Differ<'_> {
    fn global(&mut self, actual: &ActualState, eligibility: &Eligibility) {
        for view in &actual.machines {
            let Some(containers) = view.known_containers() else {
                continue;
            };
            if !eligibility.contains(&view.machine.id) {
                self.remove_all(containers, RemoveReason::PlacementExcluded);
                continue;
            }
            match containers.split_first() {
                None => self.create(&view.machine.id),
                Some((oldest, duplicates)) => {
                    self.remove_all(duplicates, RemoveReason::Duplicate);
                    self.reconcile(oldest);
                }
            }
        }
    }

    fn replicated(&mut self, actual: &ActualState, eligibility: &Eligibility) -> DeployResult<()> {
        let mut current: Vec<&ContainerRecord> = Vec::new();
        for view in &actual.machines {
            let Some(containers) = view.known_containers() else {
                continue;
            };
            if eligibility.contains(&view.machine.id) {
                current.extend(containers);
            } else {
                self.remove_all(containers, RemoveReason::PlacementExcluded);
            }
        }
        current.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let replicas = self.desired.replicas as usize;
        if current.len() > replicas {
            let excess = current.len() - replicas;
            let removed: Vec<&ContainerRecord> = match self.options.scale_down_policy {
                ScaleDownPolicy::NewestFirst => current.split_off(replicas),
                ScaleDownPolicy::OldestFirst => current.drain(..excess).collect(),
            };
            for c in removed {
                self.remove(c, RemoveReason::ScaleDown);
            }
        }

        let missing = replicas.saturating_sub(current.len());
        if missing > 0 {
            let candidates: Vec<Candidate> = actual
                .machines
                .iter()
                .filter(|v| v.is_reachable() && eligibility.contains(&v.machine.id))
                .map(|v| Candidate::new(&v.machine.id, &v.machine.name, load(v, &current)))
                .collect();
            if candidates.is_empty() {
                return Err(DeployError::NoCapacity {
                    service: self.desired.name.clone(),
                    missing,
                });
            }
            for machine_id in spread(&candidates, missing) {
                self.create(&machine_id);
            }
        }

        for c in current {
            self.reconcile(c);
        }
        Ok(())
    }

    /// Bring one surviving container in line with the desired spec.
    fn reconcile(&mut self, container: &ContainerRecord) {
        if let Some(reason) = self.recreate_reason(container) {
            self.ops.push(Operation::Recreate {
                machine_id: container.machine_id.clone(),
                container: container.to_ref(),
                spec: self.desired.container.clone(),
                reason,
                order: RecreateOrder::default(),
            });
        } else if container.status.is_stopped() {
            self.ops.push(Operation::Start {
                machine_id: container.machine_id.clone(),
                container: container.to_ref(),
            });
        }
    }

    fn recreate_reason(&self, container: &ContainerRecord) -> Option<RecreateReason> {
        if self.options.force_recreate {
            return Some(RecreateReason::Forced);
        }
        if container.fingerprint != *self.target {
            debug!(
                container = %short_id(&container.id),
                recorded = container.fingerprint.short(),
                desired = self.target.short(),
                "configuration drift"
            );
            let (from, to) = (&container.spec.image, &self.desired.container.image);
            return Some(if from != to {
                RecreateReason::ImageChanged {
                    from: from.clone(),
                    to: to.clone(),
                }
            } else {
                RecreateReason::ConfigChanged
            });
        }
        (container.status == ContainerStatus::Dead).then_some(RecreateReason::Dead)
    }

    fn create(&mut self, machine_id: &str) {
        self.ops.push(Operation::Create {
            machine_id: machine_id.to_string(),
            spec: self.desired.container.clone(),
        });
    }

    fn remove(&mut self, container: &ContainerRecord, reason: RemoveReason) {
        self.ops.push(Operation::Remove {
            machine_id: container.machine_id.clone(),
            container: container.to_ref(),
            reason,
        });
    }

    fn remove_all(&mut self, containers: &[ContainerRecord], reason: RemoveReason) {
        for c in containers {
            self.remove(c, reason);
        }
    }
}

/// Surviving containers of the service on `view`'s machine.
fn load(view: &MachineView, survivors: &[&ContainerRecord]) -> usize {
    survivors
        .iter()
        .filter(|c| c.machine_id == view.machine.id)
        .count()
}
