//! Weather-Derivative Trading Pipeline - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Weather-derivative detection/trading pipeline bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via WX_BOT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    wx_telemetry::init_logging()?;

    info!("starting wx-bot v{}", env!("CARGO_PKG_VERSION"));

    let config = match args
        .config
        .or_else(|| std::env::var("WX_BOT_CONFIG").ok())
    {
        Some(path) => {
            info!(config_path = %path, "loading configuration");
            wx_bot::AppConfig::from_file(&path)?
        }
        None => {
            info!("no config path given, loading config/default.toml or built-in defaults");
            wx_bot::AppConfig::load()?
        }
    };
    info!(simulate = config.simulate, "configuration loaded");

    let app = wx_bot::Application::new(config)?;

    app.run().await?;

    Ok(())
}
