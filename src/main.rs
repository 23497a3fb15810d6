//! Calbot - Conversational scheduling assistant
//!
//! Main entry point for the Calbot HTTP service.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use calbot::config::Config;
use calbot::server;

#[derive(Debug, Parser)]
#[command(name = "calbot", about = "Conversational scheduling assistant", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "CALBOT_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path)?;
    config.validate()?;

    tracing::info!("Starting calbot v{}", env!("CARGO_PKG_VERSION"));
    server::run(config).await
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("calbot=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
