//! ServerHandler implementation for the Fabric SQL MCP Server.
//!
//! This module implements the rmcp `ServerHandler` trait which defines how
//! the server responds to MCP protocol requests.

use crate::server::FabricSqlServer;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::tool_handler;
use tracing::info;

/// The `#[tool_handler]` macro wires up tool routing automatically.
/// It generates the `list_tools` and `call_tool` method implementations.
#[tool_handler]
impl ServerHandler for FabricSqlServer {
    /// Server identification - called during initialization handshake.
    fn get_info(&self) -> ServerInfo {
        info!("MCP client requesting server info");

        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,

            capabilities: ServerCapabilities::builder().enable_tools().build(),

            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                title: Some("Fabric SQL Assistant".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },

            instructions: Some(build_instructions(self)),
        }
    }
}

/// Build server instructions based on the startup configuration.
fn build_instructions(server: &FabricSqlServer) -> String {
    let mut instructions = String::new();

    instructions.push_str("# Fabric SQL Assistant\n\n");
    instructions.push_str(
        "Answers natural-language questions about a Microsoft Fabric or Azure SQL database \
         by generating and running T-SQL.\n\n",
    );

    match &server.config.target {
        Some(target) => {
            instructions.push_str(&format!(
                "**Preconfigured database:** `{}` on `{}`\n\n",
                target.database, target.server
            ));
        }
        None => {
            instructions.push_str(
                "**No database configured yet.** Call `configure_database` first.\n\n",
            );
        }
    }

    instructions.push_str("## Workflow\n");
    instructions.push_str("1. `configure_database` to set the server and database\n");
    instructions.push_str("2. `discover_schema` to load tables, columns and relationships\n");
    instructions.push_str("3. `ask_database` for questions in plain language\n");
    instructions.push_str("4. `get_table_details` or `execute_sql_query` for direct inspection\n\n");

    instructions.push_str(&format!(
        "Authentication: {}\n",
        server.config.database.auth.mode()
    ));
    if server.config.oracle.api_key.is_none() {
        instructions.push_str(
            "- ⚠️ No language model key is configured; `ask_database` falls back to sample queries\n",
        );
    }

    instructions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseTarget};

    #[test]
    fn test_instructions_without_target() {
        let server = FabricSqlServer::new(Config::default()).unwrap();
        let text = build_instructions(&server);
        assert!(text.contains("No database configured yet"));
        assert!(text.contains("falls back to sample queries"));
    }

    #[test]
    fn test_info_advertises_tools() {
        let config = Config {
            target: Some(DatabaseTarget::new("srv", "Sales").unwrap()),
            ..Config::default()
        };
        let server = FabricSqlServer::new(config).unwrap();
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_none());
        assert!(info.instructions.unwrap().contains("`Sales` on `srv`"));
    }
}
