//! Connection establishment with ordered profile probing.
//!
//! Fabric endpoints differ in which TLS and port settings they accept, so a
//! connection is attempted with each [`ConnectionProfile`] in turn. Each
//! candidate is verified with `SELECT 1` before it is handed out.

use super::auth::Credentials;
use crate::config::{DatabaseConfig, DatabaseTarget};
use crate::constants::DEFAULT_PORT;
use crate::error::ServerError;
use crate::fallback::{first_success, Strategy};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// Type alias for a raw tiberius connection.
pub type RawConnection = Client<Compat<TcpStream>>;

/// An open, verified connection.
pub struct Connection {
    /// The TDS client.
    pub client: RawConnection,
    /// Name of the profile that succeeded.
    pub profile: &'static str,
}

/// Connection settings tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionProfile {
    /// Strict encryption with certificate validation on the standard port.
    Optimized,
    /// Strict encryption, trusting the server certificate.
    TrustedCertificate,
    /// Encryption as negotiated by the server on the configured port.
    Simple,
}

impl ConnectionProfile {
    /// Every profile, in probing order.
    pub const ALL: [ConnectionProfile; 3] = [
        ConnectionProfile::Optimized,
        ConnectionProfile::TrustedCertificate,
        ConnectionProfile::Simple,
    ];

    /// Profile name used in logs and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionProfile::Optimized => "optimized",
            ConnectionProfile::TrustedCertificate => "trusted-certificate",
            ConnectionProfile::Simple => "simple",
        }
    }

    /// Port used for `target` under this profile.
    pub fn port(&self, target: &DatabaseTarget, config: &DatabaseConfig) -> u16 {
        let (_, explicit) = target.host_and_port();
        match self {
            ConnectionProfile::Optimized => explicit.unwrap_or(DEFAULT_PORT),
            ConnectionProfile::TrustedCertificate | ConnectionProfile::Simple => {
                explicit.unwrap_or(config.port)
            }
        }
    }

    /// Build the tiberius configuration for this profile.
    pub fn build_config(
        &self,
        target: &DatabaseTarget,
        config: &DatabaseConfig,
        auth: AuthMethod,
    ) -> Config {
        let (host, _) = target.host_and_port();
        let mut tds = Config::new();

        tds.host(host);
        tds.port(self.port(target, config));
        tds.database(&target.database);
        tds.application_name(&config.application_name);
        tds.authentication(auth);

        match self {
            ConnectionProfile::Optimized => {
                tds.encryption(EncryptionLevel::Required);
            }
            ConnectionProfile::TrustedCertificate => {
                tds.encryption(EncryptionLevel::Required);
                tds.trust_cert();
            }
            ConnectionProfile::Simple => {
                tds.encryption(EncryptionLevel::On);
            }
        }

        tds
    }
}

impl Strategy for ConnectionProfile {
    fn name(&self) -> &str {
        self.label()
    }
}

/// Opens verified connections to a target.
#[derive(Debug, Clone)]
pub struct Connector {
    config: DatabaseConfig,
    credentials: Credentials,
}

impl Connector {
    /// Create a new connector.
    pub fn new(config: DatabaseConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// Open a connection, trying each profile in order.
    ///
    /// The access token is acquired once and shared by every attempt. When
    /// all profiles fail the error lists each attempt.
    pub async fn open(&self, target: &DatabaseTarget) -> Result<Connection, ServerError> {
        let auth = self.credentials.auth_method().await?;

        let outcome = first_success(ConnectionProfile::ALL, |profile| {
            self.attempt(profile, target, auth.clone())
        })
        .await
        .map_err(|exhausted| {
            ServerError::connection(format!(
                "Could not connect to {} with any connection profile:\n{}\n\n\
                 Please check:\n\
                 - The server address is the SQL endpoint of the workspace\n\
                 - The warehouse or lakehouse is active\n\
                 - Your account has access to the database\n\
                 - Outbound traffic on port {} is allowed",
                target,
                exhausted.diagnostics(),
                DEFAULT_PORT
            ))
        })?;

        if !outcome.failures.is_empty() {
            info!(
                "Connected to {} using the {} profile after {} failed attempt(s)",
                target,
                outcome.strategy,
                outcome.failures.len()
            );
        }

        Ok(outcome.value)
    }

    async fn attempt(
        &self,
        profile: ConnectionProfile,
        target: &DatabaseTarget,
        auth: AuthMethod,
    ) -> Result<Connection, ServerError> {
        let tds = profile.build_config(target, &self.config, auth);
        let mut client = tokio::time::timeout(self.config.connection_timeout, connect(tds))
            .await
            .map_err(|_| {
                ServerError::connection(format!(
                    "timed out after {}s",
                    self.config.connection_timeout.as_secs()
                ))
            })??;

        client
            .simple_query("SELECT 1")
            .await?
            .into_results()
            .await?;

        debug!("Connection verified with the {} profile", profile.label());

        Ok(Connection {
            client,
            profile: profile.label(),
        })
    }
}

/// TCP connect plus TDS handshake, following one gateway redirect.
async fn connect(mut tds: Config) -> Result<RawConnection, ServerError> {
    let tcp = tcp_connect(&tds.get_addr()).await?;

    match Client::connect(tds.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!("Gateway redirected the connection to {}:{}", host, port);
            tds.host(&host);
            tds.port(port);
            let tcp = tcp_connect(&tds.get_addr()).await?;
            Ok(Client::connect(tds, tcp.compat_write()).await?)
        }
        Err(e) => Err(e.into()),
    }
}

async fn tcp_connect(address: &str) -> Result<TcpStream, ServerError> {
    let tcp = TcpStream::connect(address)
        .await
        .map_err(|e| ServerError::connection(format!("Failed to connect to {}: {}", address, e)))?;

    tcp.set_nodelay(true)
        .map_err(|e| ServerError::connection(format!("Failed to set TCP_NODELAY: {}", e)))?;

    Ok(tcp)
}
