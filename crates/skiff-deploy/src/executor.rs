//! Executor — runs a [`Plan`] against the cluster.
//!
//! Stages run strictly in order. Inside a stage:
//!
//! ```text
//! Eager stage          up to max_concurrency operations at once
//! Batch stage          one lane per machine, lanes concurrent,
//!                      operations within a lane sequential
//! ```
//!
//! A failed operation never aborts its siblings. Once a stage has a
//! failure, every operation of the later stages is skipped. Nothing is
//! rolled back.
//!
//! # Operation lifecycle
//!
//! ```text
//! Planned ──► InFlight ──► Succeeded
//!    │                └──► Failed
//!    ├──► Skipped     (an earlier stage failed)
//!    └──► Cancelled   (cancellation before it started)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skiff_cluster::{Client, ClientCall, ClientResult, CreateContainerRequest, RemoveOptions, StopOptions};
use skiff_core::{ContainerId, ContainerSpec, ContainerStatus, DeployConfig, RecreateOrder, short_id};

use crate::error::{DeployResult, ExecutionFailure, OperationError};
use crate::operation::Operation;
use crate::plan::{Plan, StageKind};

/// Tuning for plan execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Concurrent operations in an eager stage.
    pub max_concurrency: usize,
    /// Grace period given to a container before it is killed.
    pub stop_timeout: Duration,
    /// Remove anonymous volumes along with containers.
    pub remove_volumes: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            stop_timeout: Duration::from_secs(10),
            remove_volumes: false,
        }
    }
}

impl ExecutorConfig {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            stop_timeout: config.stop_timeout(),
            ..Default::default()
        }
    }
}

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Planned,
    InFlight,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Planned | OperationState::InFlight)
    }

    /// Transitions only move forward; there are no retries.
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Planned, InFlight)
                | (Planned, Skipped)
                | (Planned, Cancelled)
                | (InFlight, Succeeded)
                | (InFlight, Failed)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Planned => "planned",
            OperationState::InFlight => "in flight",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
            OperationState::Skipped => "skipped",
            OperationState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Final record of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// 1-based stage number.
    pub stage: usize,
    pub operation: Operation,
    pub state: OperationState,
    pub error: Option<OperationError>,
    /// Container created by a create or recreate.
    pub container_id: Option<ContainerId>,
}

impl OperationOutcome {
    fn planned(stage: usize, operation: Operation) -> Self {
        Self {
            stage,
            operation,
            state: OperationState::Planned,
            error: None,
            container_id: None,
        }
    }

    fn transition(&mut self, next: OperationState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            warn!(from = %self.state, to = %next, "ignoring invalid operation state transition");
        }
    }

    fn skipped(stage: usize, operation: Operation, cause: &str) -> Self {
        let mut outcome = Self::planned(stage, operation);
        outcome.transition(OperationState::Skipped);
        outcome.error = Some(OperationError::Skipped {
            cause: cause.to_string(),
        });
        outcome
    }

    fn cancelled(stage: usize, operation: Operation) -> Self {
        let mut outcome = Self::planned(stage, operation);
        outcome.transition(OperationState::Cancelled);
        outcome
    }

    /// One line naming the operation kind, machine, container and result.
    pub fn describe(&self) -> String {
        let op = &self.operation;
        let container = op
            .container()
            .map(|c| format!(" container {}", c.short_id()))
            .unwrap_or_default();
        match &self.error {
            Some(error) => format!(
                "{}{container} on machine {}: {}: {error}",
                op.kind(),
                op.machine_id(),
                self.state
            ),
            None => format!(
                "{}{container} on machine {}: {}",
                op.kind(),
                op.machine_id(),
                self.state
            ),
        }
    }
}

/// Every operation of a plan with its final state, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub service: String,
    pub outcomes: Vec<OperationOutcome>,
}

impl ExecutionReport {
    pub fn count(&self, state: OperationState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.state == OperationState::Succeeded)
    }

    /// Outcomes that did not succeed.
    pub fn problems(&self) -> Vec<&OperationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state != OperationState::Succeeded)
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped, {} cancelled",
            self.count(OperationState::Succeeded),
            self.count(OperationState::Failed),
            self.count(OperationState::Skipped),
            self.count(OperationState::Cancelled)
        )
    }
}

impl Plan {
    /// Execute the plan. Returns the report on full success, otherwise
    /// [`crate::DeployError::Execution`] carrying the same report.
    pub async fn execute(
        &self,
        client: &dyn Client,
        config: &ExecutorConfig,
        cancel: &CancellationToken,
    ) -> DeployResult<ExecutionReport> {
        let report = Executor::new(client, config, cancel).run(self).await;
        if report.is_success() {
            Ok(report)
        } else {
            Err(ExecutionFailure { report }.into())
        }
    }
}

/// Drives the operations of one plan.
pub struct Executor<'a> {
    client: &'a dyn Client,
    config: &'a ExecutorConfig,
    cancel: &'a CancellationToken,
}

impl<'a> Executor<'a> {
    pub fn new(
        client: &'a dyn Client,
        config: &'a ExecutorConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            config,
            cancel,
        }
    }

    /// Run every stage and report each operation's final state.
    pub async fn run(&self, plan: &Plan) -> ExecutionReport {
        let mut outcomes = Vec::with_capacity(plan.operation_count());
        let mut halted: Option<String> = None;

        for (i, stage) in plan.stages.iter().enumerate() {
            let number = i + 1;
            if self.cancel.is_cancelled() {
                outcomes.extend(
                    stage
                        .operations
                        .iter()
                        .map(|op| OperationOutcome::cancelled(number, op.clone())),
                );
                continue;
            }
            if let Some(cause) = &halted {
                outcomes.extend(
                    stage
                        .operations
                        .iter()
                        .map(|op| OperationOutcome::skipped(number, op.clone(), cause)),
                );
                continue;
            }

            info!(
                service = %plan.service,
                stage = number,
                of = plan.stages.len(),
                operations = stage.operations.len(),
                "executing stage"
            );
            let results = match stage.kind {
                StageKind::Eager => self.run_eager(plan, number, &stage.operations).await,
                StageKind::Batch { .. } => self.run_batch(plan, number, &stage.operations).await,
            };

            let failed = results
                .iter()
                .filter(|o| o.state == OperationState::Failed)
                .count();
            if failed > 0 {
                warn!(service = %plan.service, stage = number, failed, "stage failed; skipping the rest of the plan");
                halted = Some(format!("stage {number} had {failed} failed operation(s)"));
            }
            outcomes.extend(results);
        }

        let report = ExecutionReport {
            service: plan.service.clone(),
            outcomes,
        };
        info!(service = %plan.service, result = %report.summary(), "plan executed");
        report
    }

    async fn run_eager(
        &self,
        plan: &Plan,
        stage: usize,
        operations: &[Operation],
    ) -> Vec<OperationOutcome> {
        let limit = self.config.max_concurrency.max(1);
        let mut results: Vec<(usize, OperationOutcome)> = stream::iter(operations.iter().enumerate())
            .map(|(i, op)| async move { (i, self.run_op(plan, stage, op).await) })
            .buffer_unordered(limit)
            .collect()
            .await;
        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn run_batch(
        &self,
        plan: &Plan,
        stage: usize,
        operations: &[Operation],
    ) -> Vec<OperationOutcome> {
        let mut lanes: BTreeMap<&str, Vec<(usize, &Operation)>> = BTreeMap::new();
        for (i, op) in operations.iter().enumerate() {
            lanes.entry(op.machine_id()).or_default().push((i, op));
        }

        let runs = lanes.into_values().map(|lane| async move {
            let mut done = Vec::with_capacity(lane.len());
            for (i, op) in lane {
                done.push((i, self.run_op(plan, stage, op).await));
            }
            done
        });
        let mut results: Vec<(usize, OperationOutcome)> =
            join_all(runs).await.into_iter().flatten().collect();
        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn run_op(&self, plan: &Plan, stage: usize, op: &Operation) -> OperationOutcome {
        if self.cancel.is_cancelled() {
            return OperationOutcome::cancelled(stage, op.clone());
        }

        let mut outcome = OperationOutcome::planned(stage, op.clone());
        outcome.transition(OperationState::InFlight);
        debug!(
            service = %plan.service,
            op = %op.kind(),
            machine = %op.machine_id(),
            "operation started"
        );

        let mut created = None;
        let result = self.apply(plan, op, &mut created).await;
        // Kept on failure too, so a half-finished create is visible.
        outcome.container_id = created;
        match result {
            Ok(()) => {
                outcome.transition(OperationState::Succeeded);
                debug!(op = %op.kind(), machine = %op.machine_id(), "operation succeeded");
            }
            Err(e) => {
                warn!(
                    service = %plan.service,
                    op = %op.kind(),
                    machine = %op.machine_id(),
                    error = %e,
                    "operation failed"
                );
                outcome.error = Some(e);
                outcome.transition(OperationState::Failed);
            }
        }
        outcome
    }

    /// Apply one operation. The ID of a container it creates lands in
    /// `created` as soon as the create call returns.
    async fn apply(
        &self,
        plan: &Plan,
        op: &Operation,
        created: &mut Option<ContainerId>,
    ) -> Result<(), OperationError> {
        match op {
            Operation::Create { machine_id, spec } => {
                self.create(plan, machine_id, spec, created).await
            }
            Operation::Recreate {
                machine_id,
                container,
                spec,
                order,
                ..
            } => match order {
                RecreateOrder::StopFirst => {
                    self.retire(machine_id, &container.id).await?;
                    self.create(plan, machine_id, spec, created).await
                }
                RecreateOrder::StartFirst => {
                    self.create(plan, machine_id, spec, created).await?;
                    self.retire(machine_id, &container.id).await
                }
            },
            Operation::Remove {
                machine_id,
                container,
                ..
            } => {
                let record = self
                    .remote(
                        ClientCall::Inspect,
                        self.client.inspect_container(machine_id, &container.id),
                    )
                    .await?;
                if record.status.is_running() || record.status == ContainerStatus::Paused {
                    self.stop(machine_id, &container.id).await?;
                }
                self.remove(machine_id, &container.id).await
            }
            Operation::Start {
                machine_id,
                container,
            } => {
                self.remote(
                    ClientCall::Start,
                    self.client.start_container(machine_id, &container.id),
                )
                .await
            }
            Operation::Stop {
                machine_id,
                container,
            } => self.stop(machine_id, &container.id).await,
        }
    }

    /// Create, start and verify a new container.
    async fn create(
        &self,
        plan: &Plan,
        machine_id: &str,
        spec: &ContainerSpec,
        created: &mut Option<ContainerId>,
    ) -> Result<(), OperationError> {
        let request = CreateContainerRequest::new(&plan.service, plan.mode, spec)
            .with_placement(plan.placement.clone());
        let id = self
            .remote(
                ClientCall::Create,
                self.client.create_container(machine_id, &request),
            )
            .await?;
        *created = Some(id.clone());
        self.remote(ClientCall::Start, self.client.start_container(machine_id, &id))
            .await?;

        let record = self
            .remote(
                ClientCall::Inspect,
                self.client.inspect_container(machine_id, &id),
            )
            .await?;
        if record.status != ContainerStatus::Running {
            return Err(OperationError::NotRunning {
                container: short_id(&id).to_string(),
                status: record.status,
            });
        }
        debug!(machine = %machine_id, container = %short_id(&id), "container running");
        Ok(())
    }

    /// Stop then remove an existing container.
    async fn retire(&self, machine_id: &str, container_id: &str) -> Result<(), OperationError> {
        self.stop(machine_id, container_id).await?;
        self.remove(machine_id, container_id).await
    }

    async fn stop(&self, machine_id: &str, container_id: &str) -> Result<(), OperationError> {
        let options = StopOptions {
            timeout: self.config.stop_timeout,
            ..Default::default()
        };
        self.remote(
            ClientCall::Stop,
            self.client.stop_container(machine_id, container_id, &options),
        )
        .await
    }

    async fn remove(&self, machine_id: &str, container_id: &str) -> Result<(), OperationError> {
        let options = RemoveOptions {
            force: false,
            remove_volumes: self.config.remove_volumes,
        };
        self.remote(
            ClientCall::Remove,
            self.client.remove_container(machine_id, container_id, &options),
        )
        .await
    }

    /// Race one remote call against cancellation.
    async fn remote<T, F>(&self, step: ClientCall, call: F) -> Result<T, OperationError>
    where
        F: Future<Output = ClientResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(OperationError::Cancelled),
            result = call => result.map_err(OperationError::remote(step)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{RecreateReason, RemoveReason};
    use skiff_cluster::MemoryCluster;
    use skiff_core::{ContainerRef, MachineInfo, Placement, ServiceMode};

    fn cluster() -> MemoryCluster {
        MemoryCluster::with_machines([
            MachineInfo::new("m1", "alpha"),
            MachineInfo::new("m2", "beta"),
        ])
    }

    fn create(machine: &str) -> Operation {
        Operation::Create {
            machine_id: machine.to_string(),
            spec: ContainerSpec::new("app:v1"),
        }
    }

    fn cref(id: &str) -> ContainerRef {
        ContainerRef {
            id: id.to_string(),
            name: String::new(),
        }
    }

    #[test]
    fn state_transitions_only_move_forward() {
        use OperationState::*;
        assert!(Planned.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Failed));
        assert!(!Succeeded.can_transition_to(InFlight));
        assert!(!Failed.can_transition_to(InFlight));
        assert!(!InFlight.can_transition_to(Cancelled));
        assert!(Skipped.is_terminal());
        assert!(!InFlight.is_terminal());
    }

    #[tokio::test]
    async fn create_starts_and_verifies() {
        let cluster = cluster();
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling")
            .with_stage(StageKind::Eager, vec![create("m1"), create("m2")]);

        let report = plan
            .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.count(OperationState::Succeeded), 2);
        let containers = cluster.containers("web");
        assert_eq!(containers.len(), 2);
        assert!(containers.iter().all(|c| c.status == ContainerStatus::Running));
        assert_eq!(
            report.outcomes[0].container_id.as_deref(),
            Some(
                containers
                    .iter()
                    .find(|c| c.machine_id == "m1")
                    .unwrap()
                    .id
                    .as_str()
            )
        );
    }

    #[tokio::test]
    async fn failed_stage_skips_the_rest() {
        let cluster = cluster();
        cluster.fail("m2", ClientCall::Create, "disk full");
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling")
            .with_stage(StageKind::Eager, vec![create("m1"), create("m2")])
            .with_stage(StageKind::Eager, vec![create("m1")]);

        let err = plan
            .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        let crate::DeployError::Execution(failure) = err else {
            panic!("expected execution failure");
        };
        let report = &failure.report;
        assert_eq!(report.outcomes[0].state, OperationState::Succeeded);
        assert_eq!(report.outcomes[1].state, OperationState::Failed);
        assert_eq!(report.outcomes[2].state, OperationState::Skipped);
        assert!(matches!(
            report.outcomes[1].error,
            Some(OperationError::Remote {
                step: ClientCall::Create,
                ..
            })
        ));

        let message = failure.to_string();
        assert!(message.contains("2 of 3 operation(s) did not succeed"));
        assert!(message.contains("create on machine m2: failed"));
        assert_eq!(cluster.containers("web").len(), 1);
    }

    fn recreate(machine: &str, old: &str, order: RecreateOrder) -> Operation {
        Operation::Recreate {
            machine_id: machine.to_string(),
            container: cref(old),
            spec: ContainerSpec::new("app:v2"),
            reason: RecreateReason::ImageChanged {
                from: "app:v1".to_string(),
                to: "app:v2".to_string(),
            },
            order,
        }
    }

    fn failure(err: crate::DeployError) -> crate::ExecutionFailure {
        match err {
            crate::DeployError::Execution(failure) => failure,
            other => panic!("expected execution failure, got: {other}"),
        }
    }

    #[tokio::test]
    async fn create_labels_plan_placement() {
        let cluster = cluster();
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling")
            .with_placement(Placement::machines(["alpha"]))
            .with_stage(StageKind::Eager, vec![create("m1")]);
        plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            cluster.containers("web")[0].placement,
            Placement::machines(["alpha"])
        );
    }

    #[tokio::test]
    async fn container_that_exits_fails_batch_and_skips_the_next() {
        let cluster = cluster();
        let v1 = ContainerSpec::new("app:v1");
        let a = cluster.seed_container("m1", "web", &v1, ContainerStatus::Running, 1);
        let b = cluster.seed_container("m2", "web", &v1, ContainerStatus::Running, 2);
        cluster.fail_to_run("m1");

        let plan = Plan::new("web", ServiceMode::Replicated, "rolling")
            .with_stage(
                StageKind::Batch { index: 1, total: 2 },
                vec![recreate("m1", &a, RecreateOrder::StopFirst)],
            )
            .with_stage(
                StageKind::Batch { index: 2, total: 2 },
                vec![recreate("m2", &b, RecreateOrder::StopFirst)],
            );
        let failure = failure(
            plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
                .await
                .unwrap_err(),
        );
        let report = &failure.report;

        assert_eq!(report.outcomes[0].state, OperationState::Failed);
        assert!(matches!(
            report.outcomes[0].error,
            Some(OperationError::NotRunning {
                status: ContainerStatus::Exited,
                ..
            })
        ));
        assert!(report.outcomes[0].container_id.is_some());
        assert_eq!(report.outcomes[1].state, OperationState::Skipped);

        let on_m2: Vec<_> = cluster
            .containers("web")
            .into_iter()
            .filter(|c| c.machine_id == "m2")
            .collect();
        assert_eq!(on_m2.len(), 1);
        assert_eq!(on_m2[0].id, b);
    }

    #[tokio::test]
    async fn start_first_keeps_new_container_id_when_retire_fails() {
        let cluster = cluster();
        let old = cluster.seed_container(
            "m1",
            "web",
            &ContainerSpec::new("app:v1"),
            ContainerStatus::Running,
            1,
        );
        cluster.fail("m1", ClientCall::Stop, "stop timed out");

        let plan = Plan::new("web", ServiceMode::Replicated, "rolling").with_stage(
            StageKind::Batch { index: 1, total: 1 },
            vec![recreate("m1", &old, RecreateOrder::StartFirst)],
        );
        let failure = failure(
            plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
                .await
                .unwrap_err(),
        );
        let outcome = &failure.report.outcomes[0];
        assert_eq!(outcome.state, OperationState::Failed);
        assert!(matches!(
            outcome.error,
            Some(OperationError::Remote {
                step: ClientCall::Stop,
                ..
            })
        ));

        let surge = cluster
            .containers("web")
            .into_iter()
            .find(|c| c.spec.image == "app:v2")
            .map(|c| c.id);
        assert!(surge.is_some());
        assert_eq!(outcome.container_id, surge);
    }

    #[tokio::test]
    async fn missing_image_fails_create() {
        let cluster = cluster();
        cluster.mark_image_missing("app:v1");
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling")
            .with_stage(StageKind::Eager, vec![create("m1")]);
        let err = plan
            .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("image not found"));
    }

    #[tokio::test]
    async fn stop_first_recreate_replaces_container() {
        let cluster = cluster();
        let old = cluster.seed_container(
            "m1",
            "web",
            &ContainerSpec::new("app:v1"),
            ContainerStatus::Running,
            1,
        );
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling").with_stage(
            StageKind::Batch { index: 1, total: 1 },
            vec![Operation::Recreate {
                machine_id: "m1".to_string(),
                container: cref(&old),
                spec: ContainerSpec::new("app:v2"),
                reason: RecreateReason::Forced,
                order: RecreateOrder::StopFirst,
            }],
        );
        plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        let containers = cluster.containers("web");
        assert_eq!(containers.len(), 1);
        assert_ne!(containers[0].id, old);
        assert_eq!(containers[0].spec.image, "app:v2");
        // Stop, remove, create, start.
        assert_eq!(cluster.running_history("web"), vec![0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn start_first_recreate_surges() {
        let cluster = cluster();
        let old = cluster.seed_container(
            "m1",
            "web",
            &ContainerSpec::new("app:v1"),
            ContainerStatus::Running,
            1,
        );
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling").with_stage(
            StageKind::Batch { index: 1, total: 1 },
            vec![Operation::Recreate {
                machine_id: "m1".to_string(),
                container: cref(&old),
                spec: ContainerSpec::new("app:v2"),
                reason: RecreateReason::Forced,
                order: RecreateOrder::StartFirst,
            }],
        );
        plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        // Create, start, stop, remove: never below one running.
        assert_eq!(cluster.running_history("web"), vec![1, 2, 1, 1]);
        assert_eq!(cluster.containers("web").len(), 1);
    }

    #[tokio::test]
    async fn remove_stops_running_container_first() {
        let cluster = cluster();
        let id = cluster.seed_container(
            "m1",
            "web",
            &ContainerSpec::new("app:v1"),
            ContainerStatus::Running,
            1,
        );
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling").with_stage(
            StageKind::Eager,
            vec![Operation::Remove {
                machine_id: "m1".to_string(),
                container: cref(&id),
                reason: RemoveReason::ScaleDown,
            }],
        );
        plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(cluster.containers("web").is_empty());
        let calls: Vec<ClientCall> = cluster.calls().into_iter().map(|(c, _)| c).collect();
        assert_eq!(
            calls,
            vec![ClientCall::Inspect, ClientCall::Stop, ClientCall::Remove]
        );
    }

    #[tokio::test]
    async fn start_and_stop() {
        let cluster = cluster();
        let a = cluster.seed_container(
            "m1",
            "web",
            &ContainerSpec::new("app:v1"),
            ContainerStatus::Exited,
            1,
        );
        let b = cluster.seed_container(
            "m2",
            "web",
            &ContainerSpec::new("app:v1"),
            ContainerStatus::Running,
            2,
        );
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling").with_stage(
            StageKind::Eager,
            vec![
                Operation::Start {
                    machine_id: "m1".to_string(),
                    container: cref(&a),
                },
                Operation::Stop {
                    machine_id: "m2".to_string(),
                    container: cref(&b),
                },
            ],
        );
        plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        let containers = cluster.containers("web");
        assert_eq!(containers[0].status, ContainerStatus::Running);
        assert_eq!(containers[1].status, ContainerStatus::Exited);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let cluster = cluster();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling")
            .with_stage(StageKind::Eager, vec![create("m1"), create("m2")]);

        let err = plan
            .execute(&cluster, &ExecutorConfig::default(), &cancel)
            .await
            .unwrap_err();
        let crate::DeployError::Execution(failure) = err else {
            panic!("expected execution failure");
        };
        assert_eq!(failure.report.count(OperationState::Cancelled), 2);
        assert!(cluster.calls().is_empty());
    }

    #[test]
    fn executor_config_from_deploy_config() {
        let config = DeployConfig {
            max_concurrency: 0,
            stop_timeout_secs: 3,
            ..Default::default()
        };
        let exec = ExecutorConfig::from_config(&config);
        assert_eq!(exec.max_concurrency, 1);
        assert_eq!(exec.stop_timeout, Duration::from_secs(3));
        assert!(!exec.remove_volumes);
    }
}
