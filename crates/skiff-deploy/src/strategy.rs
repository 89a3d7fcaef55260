//! Deployment strategies — order and batch a diff into a [`Plan`].
//!
//! The rolling strategy keeps a service available while it changes:
//! new capacity comes first, in-place recreates follow in small
//! sequential batches, and containers only disappear at the end.

use skiff_core::{DeployConfig, RecreateOrder, ServiceMode};
use tracing::debug;

use crate::operation::{Operation, OperationKind};
use crate::plan::{Plan, StageKind};

/// Arranges unordered operations into an executable plan.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the differ should treat every container as out of date.
    fn force_recreate(&self) -> bool {
        false
    }

    fn arrange(&self, service: &str, mode: ServiceMode, operations: Vec<Operation>) -> Plan;
}

/// Rolling update: at most `batch_size` containers replaced at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingStrategy {
    pub batch_size: usize,
    pub recreate_order: RecreateOrder,
    /// Scale-down removals allowed before the plan needs approval.
    pub approval_threshold: usize,
}

impl Default for RollingStrategy {
    fn default() -> Self {
        Self {
            batch_size: 1,
            recreate_order: RecreateOrder::StopFirst,
            approval_threshold: 1,
        }
    }
}

impl RollingStrategy {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1) as usize,
            recreate_order: config.recreate_order,
            approval_threshold: config.approval_threshold as usize,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_recreate_order(mut self, order: RecreateOrder) -> Self {
        self.recreate_order = order;
        self
    }

    pub fn with_approval_threshold(mut self, threshold: usize) -> Self {
        self.approval_threshold = threshold;
        self
    }

    fn arrange_as(
        &self,
        name: &str,
        service: &str,
        mode: ServiceMode,
        operations: Vec<Operation>,
    ) -> Plan {
        let mut scale_up = Vec::new();
        let mut recreates = Vec::new();
        let mut removes = Vec::new();
        let mut stops = Vec::new();
        for op in operations {
            match op.kind() {
                OperationKind::Create | OperationKind::Start => scale_up.push(op),
                OperationKind::Recreate => recreates.push(self.with_order(op)),
                OperationKind::Remove => removes.push(op),
                OperationKind::Stop => stops.push(op),
            }
        }

        recreates.sort_by(|a, b| {
            let key = |op: &Operation| {
                (
                    op.machine_id().to_string(),
                    op.container().map(|c| c.id.clone()),
                )
            };
            key(a).cmp(&key(b))
        });

        let scale_downs = removes.iter().filter(|op| op.is_scale_down()).count();
        let batch_size = self.batch_size.max(1);
        let total = recreates.len().div_ceil(batch_size);

        let mut plan = Plan::new(service, mode, name);
        plan.push_stage(StageKind::Eager, scale_up);
        let mut recreates = recreates.into_iter().peekable();
        let mut index = 0;
        while recreates.peek().is_some() {
            index += 1;
            let batch: Vec<Operation> = recreates.by_ref().take(batch_size).collect();
            plan.push_stage(StageKind::Batch { index, total }, batch);
        }
        plan.push_stage(StageKind::Eager, removes);
        plan.push_stage(StageKind::Eager, stops);

        if scale_downs > self.approval_threshold {
            plan.require_approval(format!(
                "scales service {service} down by {scale_downs} container(s), more than the {} allowed without confirmation",
                self.approval_threshold
            ));
        }

        debug!(
            service,
            strategy = name,
            stages = plan.stages.len(),
            batches = total,
            "arranged plan"
        );
        plan
    }

    fn with_order(&self, op: Operation) -> Operation {
        match op {
            Operation::Recreate {
                machine_id,
                container,
                spec,
                reason,
                ..
            } => Operation::Recreate {
                machine_id,
                container,
                spec,
                reason,
                order: self.recreate_order,
            },
            other => other,
        }
    }
}

impl Strategy for RollingStrategy {
    fn name(&self) -> &str {
        "rolling"
    }

    fn arrange(&self, service: &str, mode: ServiceMode, operations: Vec<Operation>) -> Plan {
        self.arrange_as(self.name(), service, mode, operations)
    }
}

/// Rolling update that replaces every container, changed or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForceRecreateStrategy {
    pub rolling: RollingStrategy,
}

impl ForceRecreateStrategy {
    pub fn new(rolling: RollingStrategy) -> Self {
        Self { rolling }
    }
}

impl Strategy for ForceRecreateStrategy {
    fn name(&self) -> &str {
        "force-recreate"
    }

    fn force_recreate(&self) -> bool {
        true
    }

    fn arrange(&self, service: &str, mode: ServiceMode, operations: Vec<Operation>) -> Plan {
        self.rolling.arrange_as(self.name(), service, mode, operations)
    }
}
