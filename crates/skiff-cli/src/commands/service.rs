//! Lifecycle commands for a service that is already running.

use anyhow::{Context as _, Result, bail};
use tokio_util::sync::CancellationToken;

use skiff_core::ServiceMode;
use skiff_deploy::{
    Deployment, ForceRecreateStrategy, desired_from_state, plan_removal, plan_start, plan_stop,
    snapshot,
};

use super::{Context, apply};

pub async fn scale(
    ctx: &Context,
    service: &str,
    replicas: u32,
    cancel: &CancellationToken,
) -> Result<()> {
    let state = snapshot(&ctx.cluster, service, cancel).await?;
    let mut desired = desired_from_state(&state)?;
    if desired.mode == ServiceMode::Global {
        bail!("service {service} runs in global mode and cannot be scaled");
    }
    desired.replicas = replicas;

    let planned = Deployment::new(&ctx.cluster, desired)
        .with_strategy(ctx.rolling())
        .with_scale_down_policy(ctx.config.deploy.scale_down)
        .plan(cancel)
        .await
        .with_context(|| format!("failed to plan scaling of service {service}"))?;
    apply(ctx, &planned.plan, &planned.state, cancel).await
}

pub async fn restart(ctx: &Context, service: &str, cancel: &CancellationToken) -> Result<()> {
    let state = snapshot(&ctx.cluster, service, cancel).await?;
    let desired = desired_from_state(&state)?;

    let planned = Deployment::new(&ctx.cluster, desired)
        .with_strategy(ForceRecreateStrategy::new(ctx.rolling()))
        .plan(cancel)
        .await
        .with_context(|| format!("failed to plan restart of service {service}"))?;
    apply(ctx, &planned.plan, &planned.state, cancel).await
}

pub async fn start(ctx: &Context, service: &str, cancel: &CancellationToken) -> Result<()> {
    let state = snapshot(&ctx.cluster, service, cancel).await?;
    let plan = plan_start(&state)?;
    apply(ctx, &plan, &state, cancel).await
}

pub async fn stop(ctx: &Context, service: &str, cancel: &CancellationToken) -> Result<()> {
    let state = snapshot(&ctx.cluster, service, cancel).await?;
    let plan = plan_stop(&state)?;
    apply(ctx, &plan, &state, cancel).await
}

pub async fn remove(ctx: &Context, service: &str, cancel: &CancellationToken) -> Result<()> {
    let state = snapshot(&ctx.cluster, service, cancel).await?;
    let plan = plan_removal(&state)?;
    apply(ctx, &plan, &state, cancel).await
}
