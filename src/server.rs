//! MCP server struct definition and initialization.

use crate::assistant::Assistant;
use crate::config::Config;
use crate::database::{Connector, Credentials, FabricExecutor};
use crate::error::ServerError;
use crate::oracle::OpenAiOracle;
use crate::state::SessionContext;
use rmcp::handler::server::router::tool::ToolRouter;
use std::sync::Arc;
use tracing::{info, warn};

/// The Fabric SQL MCP Server instance.
///
/// Cloned per request; the session and collaborators are shared via `Arc`.
#[derive(Clone)]
pub struct FabricSqlServer {
    /// Configuration.
    pub(crate) config: Arc<Config>,

    /// Assistant operations over the shared session.
    pub(crate) assistant: Assistant,

    /// Tool router for dispatching tool calls.
    pub(crate) tool_router: ToolRouter<Self>,
}

impl FabricSqlServer {
    /// Create a server wired to Fabric and the chat-completions API.
    ///
    /// No connection is made here; the target may not be known yet.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let http = reqwest::Client::builder()
            .timeout(config.database.connection_timeout)
            .build()
            .map_err(|e| ServerError::internal(format!("Failed to build HTTP client: {}", e)))?;

        let credentials = Credentials::from_config(&config.database.auth, http);
        let connector = Connector::new(config.database.clone(), credentials);
        let executor = Arc::new(FabricExecutor::new(
            connector,
            config.database.max_result_rows,
        ));

        let oracle = OpenAiOracle::new(&config.oracle)?;
        if !oracle.is_enabled() {
            warn!("OPENAI_API_KEY is not set; questions will be answered with fallback queries");
        }

        let session = SessionContext::shared(config.target.clone(), config.session.history_size);
        let assistant = Assistant::with_runner(session, executor, Arc::new(oracle));

        info!(
            "Server created (auth: {}, model: {})",
            config.database.auth.mode(),
            config.oracle.model
        );

        Ok(Self::with_assistant(config, assistant))
    }

    /// Create a server around an existing assistant.
    pub fn with_assistant(config: Config, assistant: Assistant) -> Self {
        Self {
            config: Arc::new(config),
            assistant,
            tool_router: crate::tools::create_tool_router(),
        }
    }

    /// Create a server from environment variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::new(Config::from_env()?)
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the assistant.
    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    /// Authentication mode in use.
    pub fn auth_mode(&self) -> &'static str {
        self.config.database.auth.mode()
    }
}
