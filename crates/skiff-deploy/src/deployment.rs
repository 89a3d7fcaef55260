//! Deployment engine — validate, observe, diff and arrange.
//!
//! [`Deployment`] ties the pieces together for one service:
//!
//! ```text
//! DesiredSpec ─► validate ─► fetch snapshot ─► diff ─► strategy ─► Plan
//! ```
//!
//! The snapshot is returned alongside the plan so callers can render the
//! plan with real names. The plan itself is executed separately with
//! [`Plan::execute`].
//!
//! The free functions below serve lifecycle commands that act on an
//! existing service instead of a service file.

use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;
use tracing::info;

use skiff_cluster::{ActualState, Client, MachineFilter, fetch};
use skiff_core::{ContainerRecord, DesiredSpec, Placement, ScaleDownPolicy, ServiceMode};

use crate::differ::{DiffOptions, diff};
use crate::error::{DeployError, DeployResult};
use crate::operation::{Operation, RemoveReason};
use crate::plan::{Plan, StageKind};
use crate::strategy::{RollingStrategy, Strategy};

/// A plan together with the snapshot it was computed from.
#[derive(Debug, Clone)]
pub struct PlannedDeployment {
    pub plan: Plan,
    pub state: ActualState,
}

/// Plans the convergence of one service to its desired spec.
pub struct Deployment<'a> {
    client: &'a dyn Client,
    desired: DesiredSpec,
    strategy: Box<dyn Strategy>,
    scale_down_policy: ScaleDownPolicy,
    force_recreate: bool,
}

impl<'a> Deployment<'a> {
    pub fn new(client: &'a dyn Client, desired: DesiredSpec) -> Self {
        Self {
            client,
            desired,
            strategy: Box::new(RollingStrategy::default()),
            scale_down_policy: ScaleDownPolicy::default(),
            force_recreate: false,
        }
    }

    pub fn with_strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn with_scale_down_policy(mut self, policy: ScaleDownPolicy) -> Self {
        self.scale_down_policy = policy;
        self
    }

    pub fn with_force_recreate(mut self, force: bool) -> Self {
        self.force_recreate = force;
        self
    }

    pub fn desired(&self) -> &DesiredSpec {
        &self.desired
    }

    /// Compute a plan from a fresh snapshot. Never mutates the cluster.
    pub async fn plan(&self, cancel: &CancellationToken) -> DeployResult<PlannedDeployment> {
        self.desired.validate()?;
        let state = snapshot(self.client, &self.desired.name, cancel).await?;

        let options = DiffOptions {
            force_recreate: self.force_recreate || self.strategy.force_recreate(),
            scale_down_policy: self.scale_down_policy,
        };
        let operations = diff(&self.desired, &state, &options)?;
        let plan = self
            .strategy
            .arrange(&self.desired.name, self.desired.mode, operations)
            .with_placement(self.desired.placement.clone());

        info!(
            service = %self.desired.name,
            strategy = self.strategy.name(),
            operations = plan.operation_count(),
            stages = plan.stages.len(),
            approval = plan.requires_approval,
            "planned deployment"
        );
        Ok(PlannedDeployment { plan, state })
    }
}

/// Snapshot `service` across every cluster machine.
pub async fn snapshot(
    client: &dyn Client,
    service: &str,
    cancel: &CancellationToken,
) -> DeployResult<ActualState> {
    Ok(fetch(client, service, &MachineFilter::all(), cancel).await?)
}

/// Rebuild a desired spec from the containers a service is running.
///
/// Uses the newest container's spec, mode and placement label. A
/// replicated service keeps its known container count; a global service
/// stays on the machines it currently occupies.
pub fn desired_from_state(actual: &ActualState) -> DeployResult<DesiredSpec> {
    let newest = newest(actual)?;
    let desired = match newest.mode {
        ServiceMode::Replicated => DesiredSpec::replicated(
            &actual.service,
            actual.container_count() as u32,
            newest.spec.clone(),
        )
        .with_placement(newest.placement.clone()),
        ServiceMode::Global => {
            let machines: BTreeSet<&str> =
                actual.containers().map(|c| c.machine_id.as_str()).collect();
            DesiredSpec::global(&actual.service, newest.spec.clone())
                .with_placement(Placement::machines(machines))
        }
    };
    Ok(desired)
}

/// Start every stopped container of the service.
pub fn plan_start(actual: &ActualState) -> DeployResult<Plan> {
    let mode = newest(actual)?.mode;
    let operations = actual
        .containers()
        .filter(|c| c.status.is_stopped())
        .map(|c| Operation::Start {
            machine_id: c.machine_id.clone(),
            container: c.to_ref(),
        })
        .collect();
    Ok(Plan::new(&actual.service, mode, "start").with_stage(StageKind::Eager, operations))
}

/// Stop every running container of the service.
pub fn plan_stop(actual: &ActualState) -> DeployResult<Plan> {
    let mode = newest(actual)?.mode;
    let operations = actual
        .containers()
        .filter(|c| c.status.is_running())
        .map(|c| Operation::Stop {
            machine_id: c.machine_id.clone(),
            container: c.to_ref(),
        })
        .collect();
    Ok(Plan::new(&actual.service, mode, "stop").with_stage(StageKind::Eager, operations))
}

/// Remove every known container of the service. Always needs approval.
pub fn plan_removal(actual: &ActualState) -> DeployResult<Plan> {
    let mode = newest(actual)?.mode;
    let operations: Vec<Operation> = actual
        .containers()
        .map(|c| Operation::Remove {
            machine_id: c.machine_id.clone(),
            container: c.to_ref(),
            reason: RemoveReason::ServiceRemoval,
        })
        .collect();

    let count = operations.len();
    let mut plan =
        Plan::new(&actual.service, mode, "remove").with_stage(StageKind::Eager, operations);
    let unreachable = actual.unreachable().count();
    let reason = if unreachable > 0 {
        format!(
            "removes all {count} reachable container(s) of service {}; {unreachable} unreachable machine(s) are left untouched",
            actual.service
        )
    } else {
        format!("removes all {count} container(s) of service {}", actual.service)
    };
    plan.require_approval(reason);
    Ok(plan)
}

fn newest(actual: &ActualState) -> DeployResult<&ContainerRecord> {
    actual
        .containers()
        .max_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
        .ok_or_else(|| DeployError::ServiceNotFound(actual.service.clone()))
}
