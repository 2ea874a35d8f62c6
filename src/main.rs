//! Multi-Database MCP Server - Main entry point.
//!
//! This server provides MCP (Model Context Protocol) tools for AI assistants
//! to manage connections, tables and rows across MySQL, Oracle, PostgreSQL,
//! SQLite and SQL Server.

use clap::Parser;
use multidb_mcp_server::config::{Config, ConfigManager, TransportMode};
use multidb_mcp_server::db::{ConnectionManager, QueryExecutor};
use multidb_mcp_server::error_log::ErrorLog;
use multidb_mcp_server::mcp::DbService;
use multidb_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the stdio transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        transport = %config.transport,
        config_path = %config.config_path.display(),
        "Starting Multi-Database MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config_manager = Arc::new(ConfigManager::load(&config.config_path).await?);
    let connection_manager = Arc::new(ConnectionManager::new());

    // Connect to every enabled connection; failures are reported, not fatal
    let results = connection_manager
        .initialize(config_manager.enabled_connections().await)
        .await;
    for (name, connected) in &results {
        if !connected {
            warn!(connection_name = %name, "Connection unavailable at startup");
        }
    }
    info!(
        total = results.len(),
        connected = results.values().filter(|ok| **ok).count(),
        "Connections initialized"
    );

    let service = DbService::new(
        connection_manager,
        config_manager,
        QueryExecutor::with_timeout(config.query_timeout_duration()),
        ErrorLog::new(&config.error_log_path),
    );

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            StdioTransport::new(service).run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                service,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
