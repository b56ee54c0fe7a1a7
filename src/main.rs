//! Mission Orchestrator daemon entry point

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mission-orchestrator")]
#[command(about = "Container-based simulation mission orchestrator")]
#[command(version)]
struct Cli {
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
                .unwrap_or_else(|_| format!("mission_orchestrator={}", log_level).into()),
        )
        .init();

    info!("starting mission orchestrator v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = mission_orchestrator::cmd::root::run(&cli.config).await {
        error!(error = %e, "orchestrator error");
        std::process::exit(1);
    }

    Ok(())
}
