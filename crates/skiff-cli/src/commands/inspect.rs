//! `skiff ps` and `skiff machines`.

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;

use skiff_cluster::{Client, MachineFilter, Reachability};
use skiff_core::{MachineInfo, short_id};
use skiff_deploy::snapshot;

use super::Context;

pub async fn ps(ctx: &Context, service: &str, cancel: &CancellationToken) -> Result<()> {
    let state = snapshot(&ctx.cluster, service, cancel).await?;

    println!(
        "{:<14} {:<16} {:<14} {:<24} {:<10}",
        "CONTAINER ID", "NAME", "MACHINE", "IMAGE", "STATUS"
    );
    for view in &state.machines {
        match &view.containers {
            Reachability::Reachable(containers) => {
                for c in containers {
                    println!(
                        "{:<14} {:<16} {:<14} {:<24} {:<10}",
                        short_id(&c.id),
                        c.name,
                        view.machine.name,
                        c.spec.image,
                        c.status
                    );
                }
            }
            Reachability::Unreachable { reason } => {
                eprintln!("warning: machine {} unreachable: {reason}", view.machine.name);
            }
        }
    }
    Ok(())
}

pub async fn machines(ctx: &Context) -> Result<()> {
    let machines = ctx.cluster.list_machines(&MachineFilter::all()).await?;
    let containers = ctx.cluster.state().containers;

    println!("{:<20} {:<16} {:<6} {:>10}", "ID", "NAME", "STATE", "CONTAINERS");
    for m in machines {
        let count = containers.iter().filter(|c| c.machine_id == m.id).count();
        println!("{:<20} {:<16} {:<6} {:>10}", short_id(&m.id), m.name, m.state, count);
    }
    Ok(())
}

pub fn add_machine(ctx: &Context, name: &str, id: Option<&str>) -> Result<()> {
    let id = id.unwrap_or(name);
    let existing = ctx.cluster.state().machines;
    if existing.iter().any(|m| m.id == id || m.name == name) {
        bail!("machine {name} already exists");
    }
    ctx.cluster.add_machine(MachineInfo::new(id, name));
    ctx.save()?;
    println!("✓ Added machine {name}");
    Ok(())
}

pub fn remove_machine(ctx: &Context, name: &str) -> Result<()> {
    let Some(machine) = ctx
        .cluster
        .state()
        .machines
        .into_iter()
        .find(|m| m.name == name || m.id == name)
    else {
        bail!("machine {name} not found");
    };
    ctx.cluster.remove_machine(&machine.id);
    ctx.save()?;
    println!("✓ Removed machine {}", machine.name);
    Ok(())
}
