//! Fabric SQL MCP Server entry point.
//!
//! This binary starts the MCP server using stdio transport for integration
//! with Claude Desktop, Cursor, and other MCP clients.

use anyhow::Result;
use fabric_sql_mcp::{Config, FabricSqlServer};
use rmcp::ServiceExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (stdout is reserved for JSON-RPC)
    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    eprintln!("Fabric SQL MCP Server v{version} starting...");
    eprintln!("Transport: stdio");

    // Load configuration from environment
    let config = Config::from_env()?;
    match &config.target {
        Some(target) => info!("Initial target: {}", target),
        None => info!("No initial target; waiting for configure_database"),
    }

    let server = FabricSqlServer::new(config)?;
    eprintln!("Server initialized. Ready to accept requests...");

    // Start serving on stdio transport
    let transport = rmcp::transport::stdio();
    let service = server.serve(transport).await?;

    tokio::select! {
        quit_reason = service.waiting() => {
            match quit_reason {
                Ok(reason) => eprintln!("Service stopped: {reason:?}"),
                Err(e) => eprintln!("Service error: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Shutdown signal received");
        }
    }

    eprintln!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with stderr output.
///
/// Logs MUST go to stderr because stdout is used for JSON-RPC communication.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,fabric_sql_mcp=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
