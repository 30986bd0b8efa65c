//! Greenspace backend server.
//!
//! Reads its configuration from a YAML file (`--config`, default
//! `config.yaml`) with `GREENSPACE_*` environment overrides, then runs until
//! Ctrl-C.

use std::path::PathBuf;

use clap::Parser;
use greenspace_server::{telemetry, App, Config};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "greenspace-server", version, about = "Urban green space backend")]
struct Args {
    /// Configuration file.
    #[arg(long, env = "GREENSPACE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let required = args.config.is_some();
    let path = args.config.unwrap_or_else(|| PathBuf::from("config.yaml"));
    let config = Config::load(&path, required)?;

    telemetry::init(&config.server.logs)?;
    tracing::info!(
        config = %path.display(),
        port = config.server.port,
        database = %config.server.database.path.display(),
        mqtt = config.mqtt.enable,
        routing = config.routing.enable,
        "Starting greenspace server"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested");
            cancel.cancel();
        });
    }

    let app = App::build(config).await?;
    app.run(cancel).await?;
    Ok(())
}
