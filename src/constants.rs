//! Centralized constants for the Fabric SQL MCP Server.
//!
//! This module contains all magic numbers and default values used throughout
//! the codebase, making them easy to find, understand, and modify.

use std::time::Duration;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default TDS port for Fabric and Azure SQL endpoints.
pub const DEFAULT_PORT: u16 = 1433;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout as Duration.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS);

/// Application name sent to the server during login.
pub const DEFAULT_APPLICATION_NAME: &str = "fabric-sql-mcp";

// =============================================================================
// Authentication Constants
// =============================================================================

/// Azure AD authority host.
pub const AZURE_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default token scope for Fabric / Azure SQL endpoints.
pub const DEFAULT_TOKEN_SCOPE: &str = "https://database.windows.net/.default";

/// Cached tokens are considered stale this long before they actually expire.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Default polling interval for the device-code flow.
pub const DEFAULT_DEVICE_CODE_INTERVAL_SECS: u64 = 5;

// =============================================================================
// Oracle Constants
// =============================================================================

/// Default chat-completions base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model used for SQL generation and summarization.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default HTTP timeout for oracle requests in seconds.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 60;

/// Token budget for SQL generation.
pub const SQL_GENERATION_MAX_TOKENS: u32 = 500;

/// Token budget for result summaries.
pub const SUMMARY_MAX_TOKENS: u32 = 200;

// =============================================================================
// Result Size Constants
// =============================================================================

/// Default maximum rows read from a single result set.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 10_000;

/// Default row limit applied by `execute_sql_query`.
pub const DEFAULT_LIMIT_ROWS: usize = 100;

/// Rows shown in the `execute_sql_query` table.
pub const EXECUTE_DISPLAY_ROWS: usize = 20;

/// Rows shown as raw data by `ask_database`.
pub const ASK_DISPLAY_ROWS: usize = 10;

/// Rows included in the summary prompt preview.
pub const SUMMARY_PREVIEW_ROWS: usize = 10;

/// Rows fetched as sample data by `get_table_details`.
pub const SAMPLE_ROWS: usize = 5;

/// Relationships listed in the `discover_schema` response.
pub const DISPLAY_RELATIONSHIPS: usize = 10;

// =============================================================================
// Session Constants
// =============================================================================

/// Default number of (question, SQL) pairs kept in the session history.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// History entries included in the SQL generation prompt.
pub const HISTORY_PROMPT_ENTRIES: usize = 3;

// =============================================================================
// Schema Heuristics
// =============================================================================

/// Substrings that mark a table as a likely fact table.
pub const FACT_TABLE_HINTS: [&str; 4] = ["sales", "order", "transaction", "fact"];

/// Column names must be longer than this to count as a relevance hit.
pub const MIN_COLUMN_MATCH_LEN: usize = 3;

/// Aggregate call prefixes checked by the post-validator.
pub const AGGREGATE_TOKENS: [&str; 5] = ["sum(", "count(", "avg(", "max(", "min("];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_limits_are_ordered() {
        assert!(SAMPLE_ROWS <= ASK_DISPLAY_ROWS);
        assert!(ASK_DISPLAY_ROWS <= EXECUTE_DISPLAY_ROWS);
        assert!(EXECUTE_DISPLAY_ROWS <= DEFAULT_LIMIT_ROWS);
        assert!(DEFAULT_LIMIT_ROWS <= DEFAULT_MAX_RESULT_ROWS);
    }

    #[test]
    fn test_history_prompt_fits_history() {
        assert!(HISTORY_PROMPT_ENTRIES <= DEFAULT_HISTORY_SIZE);
    }
}
