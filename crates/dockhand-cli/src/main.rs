//! dockhand: deploy container services to swarm hosts.
//!
//! # Usage
//!
//! ```text
//! dockhand deploy app.toml --title "release 42"
//! dockhand rollback list web-1
//! dockhand network reconcile --server edge-1
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use dockhand_core::EngineConfig;
use dockhand_deploy::Deployer;
use dockhand_exec::{DockerEngine, SystemShell};
use dockhand_state::StateStore;
use tracing::debug;

mod commands;

#[derive(Parser)]
#[command(
    name = "dockhand",
    about = "Dockhand: container deployment orchestration",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Engine configuration file. Missing file means defaults.
    #[arg(long, global = true, default_value = "dockhand.toml")]
    config: PathBuf,

    /// Record store (redb database).
    #[arg(long, global = true, default_value = "dockhand.redb")]
    state: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and deploy a service definition (TOML or JSON).
    Deploy {
        file: PathBuf,
        #[arg(short, long, default_value = "Manual deployment")]
        title: String,
    },
    /// Print the routing labels a definition would get.
    Labels { file: PathBuf },
    /// Manage rollback snapshots
    Rollback {
        #[command(subcommand)]
        action: RollbackAction,
    },
    /// Manage custom networks and proxy connectivity
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },
}

#[derive(Subcommand)]
enum RollbackAction {
    /// Re-apply a snapshot
    Run { app: String, version: u32 },
    /// List snapshots of an application
    List {
        app: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Delete a snapshot and its image tag
    Delete { app: String, version: u32 },
}

#[derive(Subcommand)]
enum NetworkAction {
    /// Create a network from a definition file (TOML or JSON).
    Create { file: PathBuf },
    Delete {
        id: String,
        #[arg(long)]
        server: Option<String>,
    },
    /// Add a network to a resource
    Assign {
        resource: String,
        network: String,
        #[arg(long)]
        server: Option<String>,
    },
    /// Remove a network from a resource
    Unassign {
        resource: String,
        network: String,
        #[arg(long)]
        server: Option<String>,
    },
    /// Attach the proxy to every required network and detach the rest.
    Reconcile {
        #[arg(long)]
        server: Option<String>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dockhand=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = EngineConfig::load_or_default(&cli.config)?;
    debug!(config = ?cli.config, state = ?cli.state, "configuration loaded");

    let store = StateStore::open(&cli.state)?;
    let engine = Arc::new(DockerEngine::from_config(&config));
    let deployer = Deployer::new(config, store, Arc::new(SystemShell), engine);

    match cli.command {
        Commands::Deploy { file, title } => commands::deploy::deploy(&deployer, &file, &title).await,
        Commands::Labels { file } => commands::deploy::labels(&deployer, &file),
        Commands::Rollback { action } => match action {
            RollbackAction::Run { app, version } => {
                commands::rollback::run(&deployer, &app, version).await
            }
            RollbackAction::List { app, format } => commands::rollback::list(&deployer, &app, &format),
            RollbackAction::Delete { app, version } => {
                commands::rollback::delete(&deployer, &app, version).await
            }
        },
        Commands::Network { action } => match action {
            NetworkAction::Create { file } => commands::network::create(&deployer, &file).await,
            NetworkAction::Delete { id, server } => {
                commands::network::delete(&deployer, &id, server.as_deref()).await
            }
            NetworkAction::Assign {
                resource,
                network,
                server,
            } => commands::network::assign(&deployer, &resource, &network, server.as_deref()).await,
            NetworkAction::Unassign {
                resource,
                network,
                server,
            } => {
                commands::network::unassign(&deployer, &resource, &network, server.as_deref()).await
            }
            NetworkAction::Reconcile { server } => {
                commands::network::reconcile(&deployer, server.as_deref()).await
            }
        },
    }
}
