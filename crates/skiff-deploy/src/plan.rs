//! Deployment plans — ordered stages of operations for one service.
//!
//! A plan is a value: building or formatting it never touches the
//! cluster. Stages run strictly one after another; operations inside a
//! stage may run concurrently (see [`crate::executor`]).

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use skiff_core::{Placement, RecreateOrder, ServiceMode, short_id};

use crate::operation::Operation;
use crate::resolver::NameResolver;

/// How the operations of a stage are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageKind {
    /// Unbatched work, run with bounded concurrency.
    Eager,
    /// One rolling-update batch (1-based index).
    Batch { index: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub operations: Vec<Operation>,
}

/// An ordered sequence of stages converging one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub service: String,
    pub mode: ServiceMode,
    /// Name of the strategy that arranged the plan.
    pub strategy: String,
    /// Allow-list labelled onto every container the plan creates.
    #[serde(default, skip_serializing_if = "Placement::is_any")]
    pub placement: Placement,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_reason: Option<String>,
}

impl Plan {
    pub fn new(service: impl Into<String>, mode: ServiceMode, strategy: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            mode,
            strategy: strategy.into(),
            placement: Placement::default(),
            stages: Vec::new(),
            requires_approval: false,
            approval_reason: None,
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Append a stage. Empty stages are dropped.
    pub fn push_stage(&mut self, kind: StageKind, operations: Vec<Operation>) {
        if !operations.is_empty() {
            self.stages.push(Stage { kind, operations });
        }
    }

    pub fn with_stage(mut self, kind: StageKind, operations: Vec<Operation>) -> Self {
        self.push_stage(kind, operations);
        self
    }

    pub fn require_approval(&mut self, reason: impl Into<String>) {
        self.requires_approval = true;
        self.approval_reason = Some(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(|s| s.operations.is_empty())
    }

    pub fn operation_count(&self) -> usize {
        self.stages.iter().map(|s| s.operations.len()).sum()
    }

    /// All operations in execution order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.stages.iter().flat_map(|s| s.operations.iter())
    }

    /// Render the plan for a human.
    pub fn format(&self, resolver: Option<&dyn NameResolver>) -> String {
        let mut out = String::new();
        if self.is_empty() {
            let _ = writeln!(out, "service {} is up to date", self.service);
            return out;
        }

        let _ = writeln!(
            out,
            "plan for service {} ({} operation(s) in {} stage(s), strategy {})",
            self.service,
            self.operation_count(),
            self.stages.len(),
            self.strategy
        );
        for (i, stage) in self.stages.iter().enumerate() {
            match stage.kind {
                StageKind::Eager => {
                    let _ = writeln!(out, "stage {}:", i + 1);
                }
                StageKind::Batch { index, total } => {
                    let _ = writeln!(out, "stage {}: rolling batch {index}/{total}", i + 1);
                }
            }
            for op in &stage.operations {
                let _ = writeln!(out, "  {}", describe(op, resolver));
            }
        }
        if let Some(reason) = &self.approval_reason {
            let _ = writeln!(out, "approval required: {reason}");
        }
        out
    }
}

/// One-line description of an operation.
pub fn describe(op: &Operation, resolver: Option<&dyn NameResolver>) -> String {
    let machine = resolver
        .and_then(|r| r.machine_name(op.machine_id()))
        .unwrap_or(op.machine_id());
    let container = op.container().map(|c| {
        resolver
            .and_then(|r| r.container_name(&c.id))
            .unwrap_or(short_id(&c.id))
    });
    let container = container.unwrap_or_default();

    match op {
        Operation::Create { spec, .. } => {
            format!("create container on machine {machine} ({})", spec.image)
        }
        Operation::Recreate { reason, order, .. } => match order {
            RecreateOrder::StopFirst => {
                format!("recreate container {container} on machine {machine}: {reason}")
            }
            RecreateOrder::StartFirst => format!(
                "recreate container {container} on machine {machine}: {reason} (start first)"
            ),
        },
        Operation::Remove { reason, .. } => {
            format!("remove container {container} on machine {machine}: {reason}")
        }
        Operation::Start { .. } => format!("start container {container} on machine {machine}"),
        Operation::Stop { .. } => format!("stop container {container} on machine {machine}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{RecreateReason, RemoveReason};
    use crate::resolver::StaticNames;
    use skiff_core::{ContainerRef, ContainerSpec};

    const ID: &str = "ab12cd34ef56ab12cd34ef56";

    fn container() -> ContainerRef {
        ContainerRef {
            id: ID.to_string(),
            name: "web-ab12".to_string(),
        }
    }

    fn sample() -> Plan {
        let mut plan = Plan::new("web", ServiceMode::Replicated, "rolling");
        plan.push_stage(
            StageKind::Eager,
            vec![Operation::Create {
                machine_id: "m1".to_string(),
                spec: ContainerSpec::new("app:v2"),
            }],
        );
        plan.push_stage(StageKind::Eager, vec![]);
        plan.push_stage(
            StageKind::Batch { index: 1, total: 1 },
            vec![Operation::Recreate {
                machine_id: "m2".to_string(),
                container: container(),
                spec: ContainerSpec::new("app:v2"),
                reason: RecreateReason::ImageChanged {
                    from: "app:v1".to_string(),
                    to: "app:v2".to_string(),
                },
                order: RecreateOrder::StopFirst,
            }],
        );
        plan
    }

    #[test]
    fn empty_stages_are_dropped() {
        let plan = sample();
        assert_eq!(plan.stages.len(), 2);
        assert_eq!(plan.operation_count(), 2);
        assert!(!plan.is_empty());
        assert!(Plan::new("web", ServiceMode::Global, "rolling").is_empty());
    }

    #[test]
    fn format_without_resolver_uses_ids() {
        let text = sample().format(None);
        assert!(text.contains("create container on machine m1 (app:v2)"));
        assert!(text.contains(
            "recreate container ab12cd34ef56 on machine m2: image changed app:v1 -> app:v2"
        ));
        assert!(text.contains("stage 2: rolling batch 1/1"));
    }

    #[test]
    fn format_with_resolver_uses_names() {
        let names = StaticNames::new()
            .with_machine("m2", "beta")
            .with_container(ID, "web-ab12");
        let text = sample().format(Some(&names));
        assert!(text.contains(
            "recreate container web-ab12 on machine beta: image changed app:v1 -> app:v2"
        ));
        // m1 is unknown to the resolver.
        assert!(text.contains("create container on machine m1"));
    }

    #[test]
    fn approval_is_rendered() {
        let mut plan = Plan::new("web", ServiceMode::Replicated, "rolling").with_stage(
            StageKind::Eager,
            vec![Operation::Remove {
                machine_id: "m1".to_string(),
                container: container(),
                reason: RemoveReason::ServiceRemoval,
            }],
        );
        plan.require_approval("removes every container of service web");
        let text = plan.format(None);
        assert!(text.ends_with("approval required: removes every container of service web\n"));
    }

    #[test]
    fn up_to_date_plan() {
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling");
        assert_eq!(plan.format(None), "service web is up to date\n");
    }

    #[test]
    fn json_roundtrip_keeps_stages() {
        let plan = sample();
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"kind\":\"batch\""));
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
