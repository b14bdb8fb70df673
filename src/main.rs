//! Main entry point for the marketplace-order-poller CLI

use clap::Parser;
use marketplace_order_poller::cli::{Cli, Commands};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    // Check if JSON output is requested via environment variable
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("marketplace_order_poller=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    // Ctrl+C abandons the run: backoff sleeps are plain awaits, so there is
    // nothing to flush beyond what was already written.
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received - abandoning run");
            std::process::exit(130);
        }
    });

    let result = match cli.command {
        Commands::Orders(ref args) => args
            .execute_orders(&cli)
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Addresses(ref args) => args
            .execute_addresses(&cli)
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::OrderItems(ref args) => args
            .execute_order_items(&cli)
            .await
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
