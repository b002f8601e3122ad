//! Converge CLI - Run agent runtimes from a config file
//!
//! ```bash
//! # Run one idle agent on the in-process transport
//! converge run
//!
//! # Run three agents over TCP with a shared pool
//! converge run -c converge.toml -v
//! ```
//!
//! Configuration keys (all optional): `transport`, `host`, `port`, `agents`,
//! `pool_id`, `discovery_store`. `CONVERGE_<KEY>` environment variables
//! override file values.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod config;
mod run;

use config::Config;

/// Converge agent runtime
#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Converge Contributors")]
#[command(version)]
#[command(about = "Coordination and messaging runtime for autonomous agents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run agent runtimes until interrupted
    Run {
        /// Config file path (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, verbose } => {
            init_logging(verbose);
            let config = Config::load(config.as_deref())?;
            run::run(config).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
