//! `skiff` subcommands and the state they share.

pub mod deploy;
pub mod inspect;
pub mod service;

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use tokio_util::sync::CancellationToken;

use skiff_cluster::MemoryCluster;
use skiff_core::SkiffConfig;
use skiff_deploy::{ExecutorConfig, NameResolver, Plan, RollingStrategy};

/// Loaded configuration and cluster for one invocation.
pub struct Context {
    pub config: SkiffConfig,
    pub state_path: PathBuf,
    pub cluster: MemoryCluster,
    pub assume_yes: bool,
}

impl Context {
    /// Load `skiff.toml` and open the cluster state file.
    ///
    /// With `create`, a missing state file starts an empty cluster.
    pub fn load(
        config_path: Option<&Path>,
        state: Option<PathBuf>,
        assume_yes: bool,
        create: bool,
    ) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read working directory")?;
        let config = SkiffConfig::load(config_path, &cwd).context("failed to load configuration")?;

        let Some(state_path) = state.or_else(|| config.cluster.state.clone()) else {
            bail!("no cluster state file configured; pass --state or set [cluster].state in skiff.toml");
        };

        let cluster = if create && !state_path.exists() {
            MemoryCluster::new()
        } else {
            MemoryCluster::open(&state_path)
                .with_context(|| format!("failed to open cluster state {}", state_path.display()))?
        };

        Ok(Self {
            config,
            state_path,
            cluster,
            assume_yes,
        })
    }

    pub fn save(&self) -> Result<()> {
        self.cluster
            .save(&self.state_path)
            .with_context(|| format!("failed to write cluster state {}", self.state_path.display()))
    }

    pub fn rolling(&self) -> RollingStrategy {
        RollingStrategy::from_config(&self.config.deploy)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::from_config(&self.config.deploy)
    }
}

/// Show `plan`, ask for confirmation, execute it and persist the cluster.
pub async fn apply(
    ctx: &Context,
    plan: &Plan,
    resolver: &dyn NameResolver,
    cancel: &CancellationToken,
) -> Result<()> {
    print!("{}", plan.format(Some(resolver)));
    if plan.is_empty() {
        return Ok(());
    }

    if !confirm(plan, ctx.assume_yes)? {
        println!("Aborted; nothing was changed.");
        return Ok(());
    }

    let result = plan
        .execute(&ctx.cluster, &ctx.executor_config(), cancel)
        .await;
    // Persist partial progress too.
    ctx.save()?;
    let report = result?;

    println!("✓ service {}: {}", report.service, report.summary());
    Ok(())
}

fn confirm(plan: &Plan, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        bail!(
            "refusing to change service {} without confirmation: stdin is not a terminal (pass --yes or set SKIFF_AUTO_CONFIRM=1)",
            plan.service
        );
    }

    let prompt = if plan.requires_approval {
        "This plan needs explicit approval. Apply it? [y/N] "
    } else {
        "Apply this plan? [y/N] "
    };
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::{MachineInfo, ServiceMode};

    #[test]
    fn yes_answers() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[test]
    fn assume_yes_skips_prompt() {
        let plan = Plan::new("web", ServiceMode::Replicated, "rolling");
        assert!(confirm(&plan, true).unwrap());
    }

    #[test]
    fn load_requires_state_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("skiff.toml");
        std::fs::write(&config, "[deploy]\nbatch_size = 2\n").unwrap();
        let err = Context::load(Some(&config), None, false, false).err().unwrap();
        assert!(err.to_string().contains("no cluster state file"));
    }

    #[test]
    fn load_creates_and_saves_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("skiff.toml");
        std::fs::write(&config, "").unwrap();
        let state = dir.path().join("cluster.json");

        let ctx = Context::load(Some(&config), Some(state.clone()), true, true).unwrap();
        ctx.cluster.add_machine(MachineInfo::new("m1", "alpha"));
        ctx.save().unwrap();

        let reopened = Context::load(Some(&config), Some(state), true, false).unwrap();
        assert_eq!(reopened.cluster.state().machines.len(), 1);
        assert_eq!(reopened.rolling().batch_size, 1);
    }

    #[test]
    fn load_missing_state_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("skiff.toml");
        std::fs::write(&config, "").unwrap();
        let missing = dir.path().join("nope.json");
        assert!(Context::load(Some(&config), Some(missing), true, false).is_err());
    }
}
