use anyhow::Result;
use clap::{Parser, Subcommand};
use fpsync::config::{FpsyncConfigFile, config_path};
use std::path::PathBuf;
use tracing::error;

mod commands;

use commands::{handle_check_config, handle_run, handle_script};

#[derive(Parser)]
#[command(name = "fpsync")]
#[command(about = "Flight plan sync between the instruments of a simulated cockpit", long_about = None)]
struct Cli {
    /// Config file (defaults to $FPSYNC_CONFIG, then ./fpsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this port
    #[arg(long, global = true)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the cockpit and read console commands from stdin
    Run,
    /// Start the cockpit and run a file of console commands
    Script {
        /// Console command file, one command per line
        file: PathBuf,
    },
    /// Validate the config and navdata, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    fpsync::log_format::init_logging();

    if let Err(e) = run(Cli::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = config_path(cli.config);
    let config = FpsyncConfigFile::load(&path)?;

    if let Commands::CheckConfig = cli.command {
        return handle_check_config(&config, &path);
    }

    if let Some(port) = cli.metrics_port {
        fpsync::metrics::init_metrics(port)?;
    }
    fpsync::metrics::initialize_sync_metrics();

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Script { file } => handle_script(config, &file).await,
        Commands::CheckConfig => Ok(()),
    }
}
