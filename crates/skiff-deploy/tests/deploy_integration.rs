//! Deployment integration tests.
//!
//! Full plan → execute cycles against an in-memory cluster: convergence,
//! rolling availability, placement, scale-down selection and
//! unreachable-machine safety.

use skiff_cluster::{Client, ClientCall, MemoryCluster};
use skiff_core::{
    ContainerSpec, ContainerStatus, DesiredSpec, MachineInfo, Placement, ScaleDownPolicy,
    ServiceMode,
};
use skiff_deploy::*;
use tokio_util::sync::CancellationToken;

fn cluster(machines: usize) -> MemoryCluster {
    MemoryCluster::with_machines(
        (1..=machines).map(|i| MachineInfo::new(format!("m{i}"), format!("node-{i}"))),
    )
}

fn v1() -> ContainerSpec {
    ContainerSpec::new("app:v1")
}

fn v2() -> ContainerSpec {
    ContainerSpec::new("app:v2")
}

async fn plan(client: &dyn Client, desired: DesiredSpec) -> PlannedDeployment {
    Deployment::new(client, desired)
        .plan(&CancellationToken::new())
        .await
        .unwrap()
}

async fn converge(client: &dyn Client, desired: DesiredSpec) -> ExecutionReport {
    let planned = plan(client, desired).await;
    planned
        .plan
        .execute(client, &ExecutorConfig::default(), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn fresh_deploy_converges_and_replans_empty() {
    let cluster = cluster(3);
    let desired = DesiredSpec::replicated("web", 5, v1());

    let report = converge(&cluster, desired.clone()).await;
    assert_eq!(report.count(OperationState::Succeeded), 5);

    let containers = cluster.containers("web");
    assert_eq!(containers.len(), 5);
    assert!(containers.iter().all(|c| c.status == ContainerStatus::Running));
    for machine in ["m1", "m2", "m3"] {
        let n = containers.iter().filter(|c| c.machine_id == machine).count();
        assert!((1..=2).contains(&n), "{machine} has {n} containers");
    }

    let again = plan(&cluster, desired).await;
    assert!(again.plan.is_empty());
}

#[tokio::test]
async fn image_update_rolls_one_at_a_time() {
    let cluster = cluster(3);
    for (i, machine) in ["m1", "m2", "m3"].into_iter().enumerate() {
        cluster.seed_container(machine, "web", &v1(), ContainerStatus::Running, i as u64 + 1);
    }

    let planned = plan(&cluster, DesiredSpec::replicated("web", 3, v2())).await;
    let plan = &planned.plan;
    assert_eq!(plan.operation_count(), 3);
    assert!(plan.operations().all(|o| o.kind() == OperationKind::Recreate));
    assert_eq!(plan.stages.len(), 3);
    for (i, stage) in plan.stages.iter().enumerate() {
        assert_eq!(stage.kind, StageKind::Batch { index: i + 1, total: 3 });
        assert_eq!(stage.operations.len(), 1);
    }
    let text = plan.format(Some(&planned.state));
    assert!(text.contains("on machine node-1: image changed app:v1 -> app:v2"));

    plan.execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    let containers = cluster.containers("web");
    assert_eq!(containers.len(), 3);
    assert!(containers.iter().all(|c| c.spec.image == "app:v2"));
    assert!(containers.iter().all(|c| c.status == ContainerStatus::Running));

    let history = cluster.running_history("web");
    assert!(!history.is_empty());
    assert!(history.iter().all(|&n| n >= 2), "availability dropped: {history:?}");
}

#[tokio::test]
async fn replica_count_holds_after_execute() {
    let cluster = cluster(2);
    cluster.seed_container("m1", "web", &v1(), ContainerStatus::Running, 1);
    cluster.seed_container("m1", "web", &v1(), ContainerStatus::Exited, 2);

    let desired = DesiredSpec::replicated("web", 4, v2());
    converge(&cluster, desired.clone()).await;

    let again = plan(&cluster, desired).await;
    assert!(
        again
            .plan
            .operations()
            .all(|o| !matches!(o.kind(), OperationKind::Create | OperationKind::Remove))
    );
    assert!(again.plan.is_empty());
    assert_eq!(cluster.containers("web").len(), 4);
}

#[tokio::test]
async fn global_runs_once_per_eligible_machine() {
    let cluster = cluster(3);
    cluster.seed_container_with_mode("m1", "agent", ServiceMode::Global, &v1(), ContainerStatus::Running, 1);
    cluster.seed_container_with_mode("m1", "agent", ServiceMode::Global, &v1(), ContainerStatus::Running, 2);
    cluster.seed_container_with_mode("m3", "agent", ServiceMode::Global, &v1(), ContainerStatus::Running, 3);

    let desired =
        DesiredSpec::global("agent", v1()).with_placement(Placement::machines(["node-1", "m2"]));
    converge(&cluster, desired.clone()).await;

    let containers = cluster.containers("agent");
    let mut machines: Vec<_> = containers.iter().map(|c| c.machine_id.as_str()).collect();
    machines.sort();
    assert_eq!(machines, vec!["m1", "m2"]);
    assert!(containers.iter().all(|c| c.mode == ServiceMode::Global));
    // The oldest duplicate survives.
    assert_eq!(containers[0].created_at, 1);

    assert!(plan(&cluster, desired).await.plan.is_empty());
}

#[tokio::test]
async fn scale_from_state_keeps_placement() {
    let cluster = cluster(2);
    let desired =
        DesiredSpec::replicated("web", 1, v1()).with_placement(Placement::machines(["node-1"]));
    converge(&cluster, desired).await;
    assert_eq!(cluster.containers("web")[0].placement, Placement::machines(["node-1"]));

    let state = snapshot(&cluster, "web", &CancellationToken::new()).await.unwrap();
    let mut scaled = desired_from_state(&state).unwrap();
    assert_eq!(scaled.placement, Placement::machines(["node-1"]));
    scaled.replicas = 3;

    let planned = plan(&cluster, scaled.clone()).await;
    let targets: Vec<_> = planned.plan.operations().map(|o| o.machine_id()).collect();
    assert_eq!(targets, vec!["m1", "m1"]);
    planned
        .plan
        .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    let containers = cluster.containers("web");
    assert_eq!(containers.len(), 3);
    assert!(containers.iter().all(|c| c.machine_id == "m1"));
    assert!(
        containers
            .iter()
            .all(|c| c.placement == Placement::machines(["node-1"]))
    );

    // A restart rebuilt from state stays inside the allow-list as well.
    let state = snapshot(&cluster, "web", &CancellationToken::new()).await.unwrap();
    let restart = Deployment::new(&cluster, desired_from_state(&state).unwrap())
        .with_strategy(ForceRecreateStrategy::default())
        .plan(&CancellationToken::new())
        .await
        .unwrap();
    assert!(restart.plan.operations().all(|o| o.machine_id() == "m1"));
}

#[tokio::test]
async fn scale_down_keeps_oldest_by_default() {
    let cluster = cluster(2);
    for t in 1..=4 {
        let machine = if t % 2 == 0 { "m2" } else { "m1" };
        cluster.seed_container(machine, "web", &v1(), ContainerStatus::Running, t);
    }

    let planned = plan(&cluster, DesiredSpec::replicated("web", 2, v1())).await;
    assert!(planned.plan.requires_approval);
    planned
        .plan
        .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    let ages: Vec<u64> = cluster.containers("web").iter().map(|c| c.created_at).collect();
    assert_eq!(ages, vec![1, 2]);
}

#[tokio::test]
async fn scale_down_oldest_first_keeps_newest() {
    let cluster = cluster(2);
    for t in 1..=4 {
        let machine = if t % 2 == 0 { "m2" } else { "m1" };
        cluster.seed_container(machine, "web", &v1(), ContainerStatus::Running, t);
    }

    let planned = Deployment::new(&cluster, DesiredSpec::replicated("web", 2, v1()))
        .with_scale_down_policy(ScaleDownPolicy::OldestFirst)
        .plan(&CancellationToken::new())
        .await
        .unwrap();
    planned
        .plan
        .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    let ages: Vec<u64> = cluster.containers("web").iter().map(|c| c.created_at).collect();
    assert_eq!(ages, vec![3, 4]);
}

#[tokio::test]
async fn unreachable_machine_is_never_touched() {
    let cluster = cluster(3);
    cluster.seed_container("m1", "web", &v1(), ContainerStatus::Running, 1);
    cluster.seed_container("m2", "web", &v1(), ContainerStatus::Running, 2);
    cluster.seed_container("m3", "web", &v1(), ContainerStatus::Running, 3);
    cluster.set_reachable("m3", false);

    let planned = plan(&cluster, DesiredSpec::replicated("web", 3, v2())).await;
    assert!(planned.plan.operations().all(|o| o.machine_id() != "m3"));
    planned
        .plan
        .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
        .await
        .unwrap();

    let touched_m3: Vec<_> = cluster
        .calls()
        .into_iter()
        .filter(|(call, machine)| machine == "m3" && *call != ClientCall::ListContainers)
        .collect();
    assert!(touched_m3.is_empty());

    let on_m3: Vec<_> = cluster
        .containers("web")
        .into_iter()
        .filter(|c| c.machine_id == "m3")
        .collect();
    assert_eq!(on_m3.len(), 1);
    assert_eq!(on_m3[0].spec.image, "app:v1");
}

#[tokio::test]
async fn restart_recreates_every_container() {
    let cluster = cluster(2);
    let a = cluster.seed_container("m1", "web", &v1(), ContainerStatus::Running, 1);
    let b = cluster.seed_container("m2", "web", &v1(), ContainerStatus::Running, 2);

    let state = snapshot(&cluster, "web", &CancellationToken::new()).await.unwrap();
    let desired = desired_from_state(&state).unwrap();
    let planned = Deployment::new(&cluster, desired)
        .with_strategy(ForceRecreateStrategy::default())
        .plan(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(planned.plan.strategy, "force-recreate");
    assert_eq!(planned.plan.operation_count(), 2);

    planned
        .plan
        .execute(&cluster, &ExecutorConfig::default(), &CancellationToken::new())
        .await
        .unwrap();
    let ids: Vec<_> = cluster.containers("web").into_iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&a) && !ids.contains(&b));
}

#[tokio::test]
async fn invalid_spec_fails_before_any_call() {
    let cluster = cluster(1);
    let err = Deployment::new(&cluster, DesiredSpec::replicated("Web_1", 0, ContainerSpec::new("")))
        .plan(&CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        DeployError::Validation(e) => assert!(e.problems.len() >= 3),
        other => panic!("unexpected error: {other}"),
    }
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn stop_start_and_remove_service() {
    let cluster = cluster(2);
    cluster.seed_container("m1", "web", &v1(), ContainerStatus::Running, 1);
    cluster.seed_container("m2", "web", &v1(), ContainerStatus::Running, 2);
    let config = ExecutorConfig::default();
    let cancel = CancellationToken::new();

    let state = snapshot(&cluster, "web", &cancel).await.unwrap();
    plan_stop(&state).unwrap().execute(&cluster, &config, &cancel).await.unwrap();
    assert!(cluster.containers("web").iter().all(|c| c.status == ContainerStatus::Exited));

    let state = snapshot(&cluster, "web", &cancel).await.unwrap();
    plan_start(&state).unwrap().execute(&cluster, &config, &cancel).await.unwrap();
    assert!(cluster.containers("web").iter().all(|c| c.status == ContainerStatus::Running));

    let state = snapshot(&cluster, "web", &cancel).await.unwrap();
    let removal = plan_removal(&state).unwrap();
    assert!(removal.requires_approval);
    removal.execute(&cluster, &config, &cancel).await.unwrap();
    assert!(cluster.containers("web").is_empty());

    let state = snapshot(&cluster, "web", &cancel).await.unwrap();
    assert!(matches!(plan_removal(&state), Err(DeployError::ServiceNotFound(_))));
}
