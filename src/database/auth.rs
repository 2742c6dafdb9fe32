//! Authentication for Fabric SQL connections.
//!
//! Fabric endpoints only accept Azure AD access tokens, which are injected
//! into the TDS login. SQL logins remain available for local SQL Server
//! instances used in development and tests.
//!
//! Tokens are acquired through an ordered chain of strategies:
//! - a cached token that is not about to expire
//! - the refresh-token grant (device-code sessions only)
//! - the client-credentials grant or the device-code flow

use crate::config::AuthConfig;
use crate::constants::{AZURE_AUTHORITY_HOST, DEFAULT_DEVICE_CODE_INTERVAL_SECS, TOKEN_EXPIRY_MARGIN};
use crate::error::ServerError;
use crate::fallback::{first_success, Strategy};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiberius::AuthMethod;
use tracing::{debug, info, warn};

/// Source of access tokens for the database endpoint.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a usable access token; may block on interactive sign-in.
    async fn acquire(&self) -> Result<String, ServerError>;
}

/// How a connection proves its identity.
#[derive(Clone)]
pub enum Credentials {
    /// SQL login with username and password.
    SqlLogin { username: String, password: String },

    /// Azure AD token injected into the login packet.
    Token(Arc<dyn TokenProvider>),
}

impl Credentials {
    /// Build credentials from configuration.
    pub fn from_config(auth: &AuthConfig, http: reqwest::Client) -> Self {
        match auth {
            AuthConfig::SqlServer { username, password } => Credentials::SqlLogin {
                username: username.clone(),
                password: password.clone(),
            },
            AuthConfig::AzureClientSecret {
                client_id,
                client_secret,
                tenant_id,
                scope,
            } => Credentials::Token(Arc::new(AzureAdTokenProvider::new(
                http,
                GrantFlow::ClientCredentials {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    tenant_id: tenant_id.clone(),
                    scope: scope.clone(),
                },
            ))),
            AuthConfig::AzureDeviceCode {
                client_id,
                tenant_id,
                scope,
            } => Credentials::Token(Arc::new(AzureAdTokenProvider::new(
                http,
                GrantFlow::DeviceCode {
                    client_id: client_id.clone(),
                    tenant_id: tenant_id.clone(),
                    scope: scope.clone(),
                },
            ))),
        }
    }

    /// Resolve to a tiberius authentication method, acquiring a token if needed.
    pub async fn auth_method(&self) -> Result<AuthMethod, ServerError> {
        match self {
            Credentials::SqlLogin { username, password } => {
                Ok(AuthMethod::sql_server(username, password))
            }
            Credentials::Token(provider) => {
                let token = provider.acquire().await?;
                Ok(AuthMethod::aad_token(token))
            }
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::SqlLogin { username, .. } => f
                .debug_struct("SqlLogin")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::Token(_) => f.write_str("Token"),
        }
    }
}

/// Azure AD grant used when no cached token is available.
#[derive(Clone)]
pub enum GrantFlow {
    /// Service principal.
    ClientCredentials {
        client_id: String,
        client_secret: String,
        tenant_id: String,
        scope: String,
    },

    /// Interactive sign-in on another device.
    DeviceCode {
        client_id: String,
        tenant_id: String,
        scope: String,
    },
}

impl GrantFlow {
    fn client_id(&self) -> &str {
        match self {
            GrantFlow::ClientCredentials { client_id, .. } | GrantFlow::DeviceCode { client_id, .. } => {
                client_id
            }
        }
    }

    fn tenant_id(&self) -> &str {
        match self {
            GrantFlow::ClientCredentials { tenant_id, .. } | GrantFlow::DeviceCode { tenant_id, .. } => {
                tenant_id
            }
        }
    }

    fn scope(&self) -> &str {
        match self {
            GrantFlow::ClientCredentials { scope, .. } | GrantFlow::DeviceCode { scope, .. } => scope,
        }
    }

    /// Strategies tried, in order, for this flow.
    fn strategies(&self) -> Vec<TokenStrategy> {
        match self {
            GrantFlow::ClientCredentials { .. } => {
                vec![TokenStrategy::Cached, TokenStrategy::ClientCredentials]
            }
            GrantFlow::DeviceCode { .. } => vec![
                TokenStrategy::Cached,
                TokenStrategy::RefreshToken,
                TokenStrategy::DeviceCode,
            ],
        }
    }
}

/// One way of obtaining a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStrategy {
    Cached,
    RefreshToken,
    ClientCredentials,
    DeviceCode,
}

impl Strategy for TokenStrategy {
    fn name(&self) -> &str {
        match self {
            TokenStrategy::Cached => "cached token",
            TokenStrategy::RefreshToken => "refresh token",
            TokenStrategy::ClientCredentials => "client credentials",
            TokenStrategy::DeviceCode => "device code",
        }
    }
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Instant,
}

impl CachedToken {
    fn from_response(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthError {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// Token provider for the Microsoft identity platform (v2 endpoints).
pub struct AzureAdTokenProvider {
    http: reqwest::Client,
    flow: GrantFlow,
    authority: String,
    cache: Mutex<Option<CachedToken>>,
}

impl AzureAdTokenProvider {
    /// Create a provider for the given grant flow.
    pub fn new(http: reqwest::Client, flow: GrantFlow) -> Self {
        Self {
            http,
            flow,
            authority: AZURE_AUTHORITY_HOST.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Override the authority host (sovereign clouds).
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", self.authority, self.flow.tenant_id(), path)
    }

    async fn attempt(&self, strategy: TokenStrategy) -> Result<CachedToken, ServerError> {
        match strategy {
            TokenStrategy::Cached => self.cached(),
            TokenStrategy::RefreshToken => self.refresh().await,
            TokenStrategy::ClientCredentials => self.client_credentials().await,
            TokenStrategy::DeviceCode => self.device_code().await,
        }
    }

    fn cached(&self) -> Result<CachedToken, ServerError> {
        match self.cache.lock().as_ref() {
            Some(token) if token.is_fresh(Instant::now()) => Ok(token.clone()),
            Some(_) => Err(ServerError::auth("cached token is about to expire")),
            None => Err(ServerError::auth("no cached token")),
        }
    }

    async fn refresh(&self) -> Result<CachedToken, ServerError> {
        let refresh_token = self
            .cache
            .lock()
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| ServerError::auth("no refresh token"))?;

        let scope = offline_scope(self.flow.scope());
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.flow.client_id()),
            ("refresh_token", refresh_token.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.http.post(self.endpoint("token")).form(&form).send().await?;
        self.parse_token(response).await
    }

    async fn client_credentials(&self) -> Result<CachedToken, ServerError> {
        let GrantFlow::ClientCredentials {
            client_id,
            client_secret,
            scope,
            ..
        } = &self.flow
        else {
            return Err(ServerError::auth("client credentials are not configured"));
        };

        debug!(
            "Requesting client-credentials token for client_id: {}",
            &client_id[..8.min(client_id.len())]
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.http.post(self.endpoint("token")).form(&form).send().await?;
        self.parse_token(response).await
    }

    async fn device_code(&self) -> Result<CachedToken, ServerError> {
        let scope = offline_scope(self.flow.scope());
        let form = [("client_id", self.flow.client_id()), ("scope", scope.as_str())];

        let response = self
            .http
            .post(self.endpoint("devicecode"))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServerError::auth(oauth_failure(response).await));
        }

        let device: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| ServerError::auth(format!("Invalid device code response: {}", e)))?;

        // stdout carries the protocol; the sign-in prompt goes to the log
        warn!(
            "{}",
            device.message.clone().unwrap_or_else(|| format!(
                "To sign in, open {} and enter the code {}",
                device.verification_uri, device.user_code
            ))
        );

        let deadline = Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = device.interval.unwrap_or(DEFAULT_DEVICE_CODE_INTERVAL_SECS);

        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if Instant::now() >= deadline {
                return Err(ServerError::auth("device code expired before sign-in completed"));
            }

            let form = [
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", self.flow.client_id()),
                ("device_code", device.device_code.as_str()),
            ];
            let response = self.http.post(self.endpoint("token")).form(&form).send().await?;

            if response.status().is_success() {
                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| ServerError::auth(format!("Invalid token response: {}", e)))?;
                return Ok(CachedToken::from_response(token));
            }

            let text = response.text().await.unwrap_or_default();
            match serde_json::from_str::<OAuthError>(&text) {
                Ok(err) if err.error == "authorization_pending" => continue,
                Ok(err) if err.error == "slow_down" => interval += DEFAULT_DEVICE_CODE_INTERVAL_SECS,
                Ok(err) => return Err(ServerError::auth(err.describe())),
                Err(_) => return Err(ServerError::auth(text)),
            }
        }
    }

    async fn parse_token(&self, response: reqwest::Response) -> Result<CachedToken, ServerError> {
        if !response.status().is_success() {
            return Err(ServerError::auth(oauth_failure(response).await));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServerError::auth(format!("Invalid token response: {}", e)))?;
        Ok(CachedToken::from_response(token))
    }
}

#[async_trait]
impl TokenProvider for AzureAdTokenProvider {
    async fn acquire(&self) -> Result<String, ServerError> {
        let outcome = first_success(self.flow.strategies(), |strategy| self.attempt(strategy))
            .await
            .map_err(|exhausted| {
                ServerError::auth(format!(
                    "Could not acquire an Azure AD token:\n{}",
                    exhausted.diagnostics()
                ))
            })?;

        if outcome.strategy != TokenStrategy::Cached.name() {
            info!("Azure AD token acquired via {}", outcome.strategy);
        }

        let token = outcome.value;
        let access_token = token.access_token.clone();
        *self.cache.lock() = Some(token);
        Ok(access_token)
    }
}

async fn oauth_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<OAuthError>(&text) {
        Ok(err) => err.describe(),
        Err(_) => format!("HTTP {}: {}", status, text),
    }
}

/// Add `offline_access` so the device-code flow yields a refresh token.
fn offline_scope(scope: &str) -> String {
    if scope.split_whitespace().any(|s| s == "offline_access") {
        scope.to_string()
    } else {
        format!("{} offline_access", scope)
    }
}
