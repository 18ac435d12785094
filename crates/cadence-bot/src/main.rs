//! cadence bot - entry point.

use anyhow::Result;
use cadence_bot::config::{AppConfig, CONFIG_ENV};
use clap::Parser;
use tracing::info;

/// Paced, self-healing account automation.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via CADENCE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Validate the configuration, print the action plan and exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    cadence_telemetry::init_logging()?;

    info!("Starting cadence bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > CADENCE_CONFIG > default path
    let config = match args.config.or_else(|| std::env::var(CONFIG_ENV).ok()) {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            AppConfig::from_file(&path)?
        }
        None => AppConfig::load()?,
    };
    config.validate()?;
    info!(
        base_url = %config.session.base_url,
        username = %config.credentials.username,
        actions = config.actions.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        for line in config.plan() {
            println!("{line}");
        }
        return Ok(());
    }

    let credentials = config.credentials.resolve()?;
    let app = cadence_bot::Application::new(config, credentials)?;
    app.run().await?;

    Ok(())
}
