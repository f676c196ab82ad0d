//! eru-core — container deployment task engine daemon.

use anyhow::Result;
use clap::Parser;
use eru_core::cmd;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "eru-core")]
#[command(about = "Container deployment task engine daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<cmd::Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("eru_core={log_level}").into()),
        )
        .init();

    info!("starting eru-core v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd::Commands::Diagnostics) => {
            cmd::diagnostics::run(&cli.config).await?;
        }
        None => {
            if let Err(e) = cmd::root::run(&cli.config).await {
                error!("engine error: {e}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
