//! metrics-sidecar binary
//!
//! Serves the RPC and scrape listeners, or runs one of the helper
//! subcommands.

use clap::Parser;
use metrics_sidecar::{
    cli::{Cli, Command, generate_config_template},
    client::SidecarClient,
    config::Config,
    producer::{self, ProducerConfig},
    server, telemetry,
};
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Config { output }) => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Configuration template written to {}", path);
                }
                None => print!("{}", template),
            }
            Ok(())
        }
        Some(Command::Produce {
            address,
            container,
            interval_ms,
            iterations,
        }) => {
            telemetry::init("info");
            let client = SidecarClient::new(address, Duration::from_secs(5))?;
            let config = ProducerConfig {
                container,
                interval: Duration::from_millis(interval_ms),
                iterations,
            };

            tracing::info!(sidecar = %client.base_url(), "Starting demo producer");
            tokio::select! {
                result = producer::run(&client, &config) => {
                    let stats = result?;
                    tracing::info!(?stats, "Demo producer finished");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Demo producer interrupted");
                }
            }
            Ok(())
        }
        None => {
            let config = Config::load_or_default(&cli.config)?;
            telemetry::init(&config.observability.log_level);
            if !Path::new(&cli.config).exists() {
                tracing::warn!(path = %cli.config, "Configuration file not found, using defaults");
            }

            tracing::info!(
                "Starting metrics-sidecar (rpc {}:{}, exposition {}:{}{})",
                config.server.host,
                config.server.port,
                config.exposition.host,
                config.exposition.port,
                config.exposition.path
            );

            server::run(config).await?;
            Ok(())
        }
    }
}
