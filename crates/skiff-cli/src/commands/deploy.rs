//! `skiff plan` and `skiff deploy` — converge a service to a service file.

use std::path::Path;

use anyhow::{Context as _, Result};
use tokio_util::sync::CancellationToken;

use skiff_core::DesiredSpec;
use skiff_deploy::{Deployment, ForceRecreateStrategy, PlannedDeployment};

use super::{Context, apply};

pub async fn plan(
    ctx: &Context,
    file: &Path,
    json: bool,
    force_recreate: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let planned = plan_file(ctx, file, force_recreate, cancel).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&planned.plan)?);
    } else {
        print!("{}", planned.plan.format(Some(&planned.state)));
    }
    Ok(())
}

pub async fn deploy(
    ctx: &Context,
    file: &Path,
    force_recreate: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let planned = plan_file(ctx, file, force_recreate, cancel).await?;
    apply(ctx, &planned.plan, &planned.state, cancel).await
}

async fn plan_file(
    ctx: &Context,
    file: &Path,
    force_recreate: bool,
    cancel: &CancellationToken,
) -> Result<PlannedDeployment> {
    let desired = DesiredSpec::from_file(file)
        .with_context(|| format!("failed to read service file {}", file.display()))?;
    let name = desired.name.clone();

    let deployment = Deployment::new(&ctx.cluster, desired)
        .with_scale_down_policy(ctx.config.deploy.scale_down);
    let deployment = if force_recreate {
        deployment.with_strategy(ForceRecreateStrategy::new(ctx.rolling()))
    } else {
        deployment.with_strategy(ctx.rolling())
    };

    deployment
        .plan(cancel)
        .await
        .with_context(|| format!("failed to plan service {name}"))
}
