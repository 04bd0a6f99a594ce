//! Edgeplane control service binary.
//!
//! Serves the inventory and deployment API for a fleet of edge nodes.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgeplane_control::{ControlConfig, ControlService};

/// Edgeplane control service.
#[derive(Parser, Debug)]
#[command(name = "edgeplane-control")]
#[command(about = "Manage and deploy to a fleet of edge nodes")]
#[command(version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialise tracing
    let filter = if cli.verbose {
        "debug,hyper=info,tower=info"
    } else {
        "edgeplane_control=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    info!("edgeplane control service starting");

    let config = match cli.config.as_deref() {
        Some(path) => ControlConfig::from_file(path)?,
        None => ControlConfig::load()?,
    };

    info!(
        listen = %config.server.listen,
        backend = ?config.database.backend,
        node_scheme = %config.nodes.scheme,
        "configuration loaded"
    );

    ControlService::new(config).run().await?;

    Ok(())
}
