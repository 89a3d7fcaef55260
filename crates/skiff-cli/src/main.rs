use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(
    name = "skiff",
    about = "Skiff — plan and roll out services across a container cluster",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to skiff.toml (default: ./skiff.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cluster state file (overrides [cluster].state in skiff.toml)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Apply changes without asking for confirmation
    #[arg(short, long, global = true, env = "SKIFF_AUTO_CONFIRM")]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what deploying a service file would change
    Plan {
        /// Service file (TOML)
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
        /// Recreate every container even if unchanged
        #[arg(long)]
        force_recreate: bool,
    },
    /// Deploy a service file
    Deploy {
        /// Service file (TOML)
        #[arg(short, long)]
        file: PathBuf,
        /// Recreate every container even if unchanged
        #[arg(long)]
        force_recreate: bool,
    },
    /// Change the replica count of a running service
    Scale { service: String, replicas: u32 },
    /// Recreate every container of a service, one batch at a time
    Restart { service: String },
    /// Start the stopped containers of a service
    Start { service: String },
    /// Stop the running containers of a service
    Stop { service: String },
    /// Remove every container of a service
    Rm { service: String },
    /// List the containers of a service
    Ps { service: String },
    /// List or manage cluster machines
    Machines {
        #[command(subcommand)]
        action: Option<MachinesAction>,
    },
}

#[derive(Subcommand)]
enum MachinesAction {
    /// Add a machine to the cluster state file
    Add {
        name: String,
        /// Machine ID (default: the name)
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove a machine and its containers from the cluster state file
    Rm { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,skiff_deploy=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling remaining operations");
            on_signal.cancel();
        }
    });

    let create_state = matches!(
        cli.command,
        Commands::Machines {
            action: Some(MachinesAction::Add { .. })
        }
    );
    let ctx = Context::load(cli.config.as_deref(), cli.state, cli.yes, create_state)?;

    match cli.command {
        Commands::Plan {
            file,
            format,
            force_recreate,
        } => {
            commands::deploy::plan(&ctx, &file, format == OutputFormat::Json, force_recreate, &cancel)
                .await
        }
        Commands::Deploy {
            file,
            force_recreate,
        } => commands::deploy::deploy(&ctx, &file, force_recreate, &cancel).await,
        Commands::Scale { service, replicas } => {
            commands::service::scale(&ctx, &service, replicas, &cancel).await
        }
        Commands::Restart { service } => commands::service::restart(&ctx, &service, &cancel).await,
        Commands::Start { service } => commands::service::start(&ctx, &service, &cancel).await,
        Commands::Stop { service } => commands::service::stop(&ctx, &service, &cancel).await,
        Commands::Rm { service } => commands::service::remove(&ctx, &service, &cancel).await,
        Commands::Ps { service } => commands::inspect::ps(&ctx, &service, &cancel).await,
        Commands::Machines { action } => match action {
            None => commands::inspect::machines(&ctx).await,
            Some(MachinesAction::Add { name, id }) => {
                commands::inspect::add_machine(&ctx, &name, id.as_deref())
            }
            Some(MachinesAction::Rm { name }) => commands::inspect::remove_machine(&ctx, &name),
        },
    }
}
