//! MCP tools for the Fabric SQL assistant.
//!
//! - `configure_database`: Set the server/database and test the connection
//! - `discover_schema`: Discover tables, columns, keys and relationships
//! - `ask_database`: Answer a natural-language question with generated SQL
//! - `get_current_config`: Show the configured target and cache state
//! - `execute_sql_query`: Run SQL directly
//! - `get_table_details`: Row count, columns and sample rows of one table

mod inputs;

pub use inputs::*;

use crate::server::FabricSqlServer;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::{tool, tool_router, ErrorData};
use tracing::debug;

/// Build the tool router for the server.
pub fn create_tool_router() -> ToolRouter<FabricSqlServer> {
    FabricSqlServer::tool_router()
}

fn text_result(text: String) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool_router]
impl FabricSqlServer {
    #[tool(description = "Configure the Fabric SQL database connection")]
    async fn configure_database(
        &self,
        Parameters(input): Parameters<ConfigureDatabaseInput>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!("configure_database: {}/{}", input.server, input.database);
        text_result(
            self.assistant
                .configure_database(&input.server, &input.database)
                .await,
        )
    }

    #[tool(
        description = "Automatically discover database schema including all tables and columns"
    )]
    async fn discover_schema(
        &self,
        Parameters(input): Parameters<DiscoverSchemaInput>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!("discover_schema: refresh={}", input.refresh);
        text_result(self.assistant.discover_schema(input.refresh).await)
    }

    #[tool(description = "Ask natural language questions about the Fabric SQL database")]
    async fn ask_database(
        &self,
        Parameters(input): Parameters<AskDatabaseInput>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!("ask_database: {}", input.question);
        text_result(
            self.assistant
                .ask_database(
                    &input.question,
                    input.include_raw_data,
                    input.use_auto_schema,
                )
                .await,
        )
    }

    #[tool(description = "Get current database configuration")]
    async fn get_current_config(&self) -> Result<CallToolResult, ErrorData> {
        let mut text = self.assistant.get_current_config().await;
        if self.assistant.session().cache.target().await.is_some() {
            text.push_str(&format!("\n**Authentication:** {}", self.auth_mode()));
        }
        text_result(text)
    }

    #[tool(description = "Execute a specific SQL query directly")]
    async fn execute_sql_query(
        &self,
        Parameters(input): Parameters<ExecuteSqlQueryInput>,
    ) -> Result<CallToolResult, ErrorData> {
        text_result(
            self.assistant
                .execute_sql_query(&input.sql, input.limit_rows)
                .await,
        )
    }

    #[tool(description = "Get detailed information about a specific table")]
    async fn get_table_details(
        &self,
        Parameters(input): Parameters<GetTableDetailsInput>,
    ) -> Result<CallToolResult, ErrorData> {
        text_result(
            self.assistant
                .get_table_details(&input.table_name, input.include_sample_data)
                .await,
        )
    }
}
