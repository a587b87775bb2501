//! Main entry point for the geoip-warden CLI tool

use anyhow::Context;
use clap::Parser;
use geoip_warden::cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = cli.load_config().context("Failed to load configuration")?;

    // Initialize logging; RUST_LOG still wins when set
    let default_level = if cli.verbose || config.global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    info!("Starting geoip-warden v{}", env!("CARGO_PKG_VERSION"));

    cli.run(config).await.context("geoip-warden failed")?;

    Ok(())
}
