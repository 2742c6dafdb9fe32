//! Tool input types with JSON Schema generation.

use crate::constants::DEFAULT_LIMIT_ROWS;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input for the `configure_database` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigureDatabaseInput {
    /// SQL endpoint address.
    #[schemars(
        description = "Fabric SQL server address (e.g., your-server.datawarehouse.fabric.microsoft.com)"
    )]
    pub server: String,

    /// Warehouse or lakehouse name.
    #[schemars(description = "Database name to connect to")]
    pub database: String,
}

/// Input for the `discover_schema` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DiscoverSchemaInput {
    /// Ignore the cached snapshot.
    #[serde(default)]
    #[schemars(description = "Force refresh of cached schema (default: false)")]
    pub refresh: bool,
}

/// Input for the `ask_database` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AskDatabaseInput {
    /// The question in plain language.
    #[schemars(description = "Natural language question about the data")]
    pub question: String,

    /// Append the first rows of the result.
    #[serde(default)]
    #[schemars(description = "Whether to include raw data results (default: false)")]
    pub include_raw_data: bool,

    /// Discover the schema when none is cached.
    #[serde(default = "default_true")]
    #[schemars(description = "Use automatically discovered schema (default: true)")]
    pub use_auto_schema: bool,
}

/// Input for the `execute_sql_query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteSqlQueryInput {
    /// SQL to run.
    #[schemars(description = "SQL query to execute")]
    pub sql: String,

    /// Row cap applied to plain SELECT statements.
    #[serde(default = "default_limit_rows")]
    #[schemars(description = "Maximum number of rows to return (default: 100)")]
    pub limit_rows: usize,
}

/// Input for the `get_table_details` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTableDetailsInput {
    /// Table name, optionally schema-qualified.
    #[schemars(description = "Name of the table to inspect")]
    pub table_name: String,

    /// Show a few rows.
    #[serde(default = "default_true")]
    #[schemars(description = "Include sample data from the table (default: true)")]
    pub include_sample_data: bool,
}

fn default_true() -> bool {
    true
}

fn default_limit_rows() -> usize {
    DEFAULT_LIMIT_ROWS
}
