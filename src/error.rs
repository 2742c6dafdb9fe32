//! Error types for the Fabric SQL MCP Server.
//!
//! This module defines semantic error types with SQL Server error code mapping
//! for user-friendly error messages.

use thiserror::Error;

/// Domain-specific errors for the Fabric SQL MCP Server.
///
/// Named `ServerError` to avoid collision with `rmcp::ErrorData`.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or invalid configuration (including an unset server/database).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The minimal schema metadata query failed; no snapshot was produced.
    #[error("Schema discovery failed: {0}")]
    Discovery(String),

    /// Connection error
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Query execution error, always carrying the offending SQL.
    #[error("Query execution failed:\nSQL: {sql}\nError: {message}")]
    QueryExecution {
        sql: String,
        message: String,
        sql_error_code: Option<u32>,
    },

    /// Text oracle failure. Callers recover locally with a fallback.
    #[error("Oracle request failed: {0}")]
    Oracle(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a discovery error.
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a query execution error.
    pub fn execution(sql: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            sql: sql.into(),
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error with the server's error number.
    pub fn execution_with_code(sql: impl Into<String>, msg: impl Into<String>, code: u32) -> Self {
        Self::QueryExecution {
            sql: sql.into(),
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create an oracle error.
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => {
                Some("Run `configure_database` with a server and database, or check your environment variables")
            }
            Self::Discovery(_) => {
                Some("Check connectivity and that your account can read INFORMATION_SCHEMA views")
            }
            Self::Connection { .. } => {
                Some("Check the endpoint address, that it is active, and network connectivity")
            }
            Self::Authentication(_) => {
                Some("Verify the Azure AD client/tenant IDs and that your account has access to the workspace")
            }
            Self::QueryExecution {
                sql_error_code: Some(code),
                ..
            } => sql_error_suggestion(*code),
            Self::QueryExecution { .. } => Some("Check the SQL syntax and your permissions"),
            Self::InvalidInput(_) => Some("Review the tool arguments"),
            _ => None,
        }
    }

    /// Render the error as user-visible text with remediation.
    pub fn to_user_message(&self) -> String {
        match self.suggestion() {
            Some(hint) => format!("❌ {}\n\n**Suggestion:** {}", self, hint),
            None => format!("❌ {}", self),
        }
    }
}

/// Map SQL Server error numbers to remediation hints.
fn sql_error_suggestion(code: u32) -> Option<&'static str> {
    match code {
        // Invalid object name
        208 => Some("The query references a table that does not exist; run `discover_schema` to see available tables"),
        // Invalid column name
        207 => Some("The query references an unknown column; check the column names with `get_table_details`"),
        // Syntax error
        102 | 156 => Some("The SQL has a syntax error; Fabric endpoints use T-SQL (TOP instead of LIMIT)"),
        // Permission denied
        229 | 230 | 262 => Some("Request appropriate permissions from your workspace administrator"),
        // Aggregation / grouping errors
        8120 => Some("Add the non-aggregated columns to a GROUP BY clause"),
        // Login failed
        18456 => Some("Verify your Azure AD account has access to this endpoint"),
        // Cannot open database
        4060 => Some("Check the database name and ensure it exists"),
        _ => Some("Check the SQL syntax and your permissions"),
    }
}

impl From<tiberius::error::Error> for ServerError {
    fn from(e: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match &e {
            Error::Io { .. } => ServerError::connection(format!("IO error: {}", e)),
            Error::Tls(_) => ServerError::connection(format!("TLS error: {}", e)),
            Error::Routing { host, port } => {
                ServerError::connection(format!("Server requested routing to {}:{}", host, port))
            }
            Error::Server(token) if token.code() == 18456 => ServerError::auth(token.message()),
            _ => ServerError::connection(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServerError::connection(format!("HTTP request timed out: {}", e))
        } else {
            ServerError::connection_with_source("HTTP request failed", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_carries_sql() {
        let err = ServerError::execution("SELECT * FROM nowhere", "Invalid object name 'nowhere'");
        let text = err.to_string();
        assert!(text.contains("SELECT * FROM nowhere"));
        assert!(text.contains("Invalid object name"));
    }

    #[test]
    fn test_error_suggestions() {
        let err = ServerError::auth("Login failed");
        assert!(err.suggestion().is_some());

        let err = ServerError::Internal("unknown".to_string());
        assert!(err.suggestion().is_none());

        let err = ServerError::execution_with_code("SELECT x FROM t", "Invalid object name 't'", 208);
        assert!(err.suggestion().unwrap().contains("discover_schema"));
    }

    #[test]
    fn test_user_message_includes_suggestion() {
        let msg = ServerError::config("No database configured").to_user_message();
        assert!(msg.starts_with("❌ Configuration error"));
        assert!(msg.contains("configure_database"));

        let msg = ServerError::internal("boom").to_user_message();
        assert_eq!(msg, "❌ Internal error: boom");
    }
}
