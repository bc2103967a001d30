//! Tempest chat server - Entry Point
//!
//! Starts the TCP listener and ChatServer actor, then serves until Ctrl-C.
//!
//! Usage: `tempest_server [--config <file.json>] [host] [port]`

use std::env;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tempest_server::{start_server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=tempest_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tempest_server=info")),
        )
        .init();

    let config = match config_from_args(env::args().skip(1).collect()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid arguments: {}", e);
            return Err(e);
        }
    };

    if config.host == "0.0.0.0" {
        info!("Accepting connections from any address");
    }

    let server = match start_server(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            return Err(e.into());
        }
    };

    tokio::signal::ctrl_c().await?;
    server.shutdown().await;

    Ok(())
}

/// Build the config from `[--config <file>] [host] [port]`
fn config_from_args(args: Vec<String>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut args = args.into_iter().peekable();

    let mut config = if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        let path = args.next().ok_or("--config requires a file path")?;
        ServerConfig::from_json_file(path)?
    } else {
        ServerConfig::default()
    };

    if let Some(host) = args.next() {
        config.host = host;
    }
    if let Some(port) = args.next() {
        config.port = port
            .parse()
            .map_err(|_| format!("Invalid port '{}'. Must be a number.", port))?;
    }

    Ok(config)
}
