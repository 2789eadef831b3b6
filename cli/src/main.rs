//! chainevents CLI — subscribe to block and chaincode events on a Fabric channel.
//!
//! # Commands
//! ```text
//! chainevents run          [--config first-network.yaml]
//! chainevents info         [--config first-network.yaml]
//! chainevents check-config [--config first-network.yaml]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use chainevents_observability::init_tracing;
use clap::{Parser, Subcommand};

mod cmd_run;
mod config;

use config::Overrides;

const DEFAULT_CONFIG: &str = "first-network.yaml";

#[derive(Parser)]
#[command(
    name = "chainevents",
    about = "Hyperledger Fabric block and chaincode event subscriber",
    long_about = "
chainevents: connect to a Fabric event gateway, print ledger info, then
report every new block and every matching chaincode event until the run
duration elapses or Ctrl-C is pressed.

ENVIRONMENT VARIABLES:
  CHAINEVENTS_ENDPOINT       Event gateway URL (ws:// or wss://)
  CHAINEVENTS_CHANNEL        Channel name
  CHAINEVENTS_USER           Enrolled user
  CHAINEVENTS_ORG            Organization of the user
  CHAINEVENTS_CHAINCODE_ID   Chaincode to receive events from
  CHAINEVENTS_EVENT_FILTER   Event-name regular expression
  CHAINEVENTS_DURATION       Seconds to run before shutting down
",
    version
)]
struct Cli {
    /// Network config file
    #[arg(short, long, global = true, env = "CHAINEVENTS_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to block and chaincode events until stopped
    Run,

    /// Print ledger info for the channel and exit
    Info,

    /// Load and validate the config, then print the resolved values
    #[command(name = "check-config")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let required = cli.config.is_some();
    let path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let loaded = config::load(&path, required, &cli.overrides)?;
    let mut app = loaded.app;
    if cli.verbose {
        app.log.level = "debug".into();
    }

    if let Commands::CheckConfig = cli.command {
        if !loaded.from_file {
            println!("# {} not found, using defaults", path.display());
        }
        let yaml = serde_yaml::to_string(&app).context("serializing config")?;
        println!("{yaml}");
        println!("config OK");
        return Ok(());
    }

    init_tracing(&app.log).context("initialising logging")?;
    if !loaded.from_file {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
    }

    match cli.command {
        Commands::Info => cmd_run::info(&app).await,
        Commands::Run => cmd_run::run(app).await,
        Commands::CheckConfig => Ok(()),
    }
}
