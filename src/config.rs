//! Configuration management for the Fabric SQL MCP Server.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.
//! The server/database target is optional at startup; it can be set later with the
//! `configure_database` tool.

use crate::constants::{
    DEFAULT_APPLICATION_NAME, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_CONNECTION_TIMEOUT_SECS,
    DEFAULT_HISTORY_SIZE, DEFAULT_MAX_RESULT_ROWS, DEFAULT_OPENAI_BASE_URL,
    DEFAULT_OPENAI_MODEL, DEFAULT_ORACLE_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_TOKEN_SCOPE,
};
use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Initial server/database target, if provided.
    pub target: Option<DatabaseTarget>,

    /// Database connection configuration
    pub database: DatabaseConfig,

    /// Language model configuration
    pub oracle: OracleConfig,

    /// Session configuration
    pub session: SessionConfig,
}

/// The server/database identity a schema snapshot belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseTarget {
    /// Endpoint address, optionally with `,port`.
    pub server: String,

    /// Database (warehouse / lakehouse) name.
    pub database: String,
}

impl DatabaseTarget {
    /// Create a target, rejecting blank values.
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Result<Self, ServerError> {
        let server = server.into().trim().to_string();
        let database = database.into().trim().to_string();

        if server.is_empty() || database.is_empty() {
            return Err(ServerError::config(
                "Both server and database parameters are required",
            ));
        }

        Ok(Self { server, database })
    }

    /// Split the server string into host and explicit port (`host,port` or `host:port`).
    pub fn host_and_port(&self) -> (&str, Option<u16>) {
        let server = self.server.strip_prefix("tcp:").unwrap_or(&self.server);
        for separator in [',', ':'] {
            if let Some((host, port)) = server.rsplit_once(separator) {
                if let Ok(port) = port.trim().parse() {
                    return (host.trim(), Some(port));
                }
            }
        }
        (server, None)
    }
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.database)
    }
}

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Port used when the server string does not carry one
    pub port: u16,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Connection timeout
    pub connection_timeout: Duration,

    /// Application name sent to the server
    pub application_name: String,

    /// Maximum rows read from a single result set
    pub max_result_rows: usize,
}

/// Authentication configuration.
#[derive(Clone)]
pub enum AuthConfig {
    /// SQL login (local SQL Server or dev containers)
    SqlServer { username: String, password: String },

    /// Azure AD service principal (client credentials flow)
    AzureClientSecret {
        client_id: String,
        client_secret: String,
        tenant_id: String,
        scope: String,
    },

    /// Azure AD interactive sign-in (device code flow)
    AzureDeviceCode {
        client_id: String,
        tenant_id: String,
        scope: String,
    },
}

impl AuthConfig {
    /// Short name of the authentication mode.
    pub fn mode(&self) -> &'static str {
        match self {
            AuthConfig::SqlServer { .. } => "sql-login",
            AuthConfig::AzureClientSecret { .. } => "azure-ad-client-secret",
            AuthConfig::AzureDeviceCode { .. } => "azure-ad-device-code",
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::SqlServer { username, .. } => f
                .debug_struct("SqlServer")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            AuthConfig::AzureClientSecret {
                client_id,
                tenant_id,
                scope,
                ..
            } => f
                .debug_struct("AzureClientSecret")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("tenant_id", tenant_id)
                .field("scope", scope)
                .finish(),
            AuthConfig::AzureDeviceCode {
                client_id,
                tenant_id,
                scope,
            } => f
                .debug_struct("AzureDeviceCode")
                .field("client_id", client_id)
                .field("tenant_id", tenant_id)
                .field("scope", scope)
                .finish(),
        }
    }
}

/// Language model (oracle) configuration.
#[derive(Clone)]
pub struct OracleConfig {
    /// API key; `None` disables the oracle and every call takes its fallback
    pub api_key: Option<String>,

    /// Chat-completions base URL
    pub base_url: String,

    /// Model name
    pub model: String,

    /// HTTP request timeout
    pub timeout: Duration,
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of (question, SQL) pairs kept for prompt context
    pub history_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Authentication (one of)
    /// - `FABRIC_SQL_USER` + `FABRIC_SQL_PASSWORD`: SQL login
    /// - `AZURE_CLIENT_ID` + `AZURE_TENANT_ID` (+ `AZURE_CLIENT_SECRET` for a service principal,
    ///   otherwise the device-code flow is used)
    ///
    /// ## Optional
    /// - `FABRIC_SQL_SERVER` / `FABRIC_DATABASE`: initial target
    /// - `FABRIC_SQL_PORT`: port when the server string has none (default: 1433)
    /// - `FABRIC_CONNECT_TIMEOUT`: connection timeout in seconds (default: 30)
    /// - `FABRIC_TOKEN_SCOPE`: Azure AD scope (default: `https://database.windows.net/.default`)
    /// - `FABRIC_MAX_ROWS`: maximum rows read per result set (default: 10000)
    /// - `FABRIC_HISTORY_SIZE`: remembered questions (default: 10)
    /// - `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`, `OPENAI_TIMEOUT`
    pub fn from_env() -> Result<Self, ServerError> {
        let target = match (env_non_empty("FABRIC_SQL_SERVER"), env_non_empty("FABRIC_DATABASE")) {
            (Some(server), Some(database)) => Some(DatabaseTarget::new(server, database)?),
            (Some(_), None) | (None, Some(_)) => {
                return Err(ServerError::config(
                    "FABRIC_SQL_SERVER and FABRIC_DATABASE must be set together",
                ))
            }
            (None, None) => None,
        };

        let auth = auth_from_env()?;

        let port = env_parse("FABRIC_SQL_PORT").unwrap_or(DEFAULT_PORT);

        let connection_timeout_secs =
            env_parse("FABRIC_CONNECT_TIMEOUT").unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS);

        let application_name = env_non_empty("FABRIC_APP_NAME")
            .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string());

        let max_result_rows = env_parse("FABRIC_MAX_ROWS").unwrap_or(DEFAULT_MAX_RESULT_ROWS);

        let oracle_timeout_secs =
            env_parse("OPENAI_TIMEOUT").unwrap_or(DEFAULT_ORACLE_TIMEOUT_SECS);

        let history_size = env_parse("FABRIC_HISTORY_SIZE").unwrap_or(DEFAULT_HISTORY_SIZE);

        Ok(Config {
            target,
            database: DatabaseConfig {
                port,
                auth,
                connection_timeout: Duration::from_secs(connection_timeout_secs),
                application_name,
                max_result_rows,
            },
            oracle: OracleConfig {
                api_key: env_non_empty("OPENAI_API_KEY"),
                base_url: env_non_empty("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: env_non_empty("OPENAI_MODEL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                timeout: Duration::from_secs(oracle_timeout_secs),
            },
            session: SessionConfig { history_size },
        })
    }
}

/// Determine the authentication mode from the environment.
fn auth_from_env() -> Result<AuthConfig, ServerError> {
    match (env_non_empty("FABRIC_SQL_USER"), env_non_empty("FABRIC_SQL_PASSWORD")) {
        (Some(username), Some(password)) => {
            return Ok(AuthConfig::SqlServer { username, password })
        }
        (Some(_), None) => {
            return Err(ServerError::config(
                "FABRIC_SQL_PASSWORD is required when FABRIC_SQL_USER is set",
            ))
        }
        (None, Some(_)) => {
            return Err(ServerError::config(
                "FABRIC_SQL_USER is required when FABRIC_SQL_PASSWORD is set",
            ))
        }
        (None, None) => {}
    }

    let client_id = env_non_empty("AZURE_CLIENT_ID").ok_or_else(|| {
        ServerError::config(
            "Authentication required: set AZURE_CLIENT_ID and AZURE_TENANT_ID, or FABRIC_SQL_USER and FABRIC_SQL_PASSWORD",
        )
    })?;
    let tenant_id = env_non_empty("AZURE_TENANT_ID")
        .ok_or_else(|| ServerError::config("AZURE_TENANT_ID is required for Azure AD authentication"))?;
    let scope = env_non_empty("FABRIC_TOKEN_SCOPE").unwrap_or_else(|| DEFAULT_TOKEN_SCOPE.to_string());

    Ok(match env_non_empty("AZURE_CLIENT_SECRET") {
        Some(client_secret) => AuthConfig::AzureClientSecret {
            client_id,
            client_secret,
            tenant_id,
            scope,
        },
        None => AuthConfig::AzureDeviceCode {
            client_id,
            tenant_id,
            scope,
        },
    })
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            auth: AuthConfig::SqlServer {
                username: "sa".to_string(),
                password: String::new(),
            },
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}
