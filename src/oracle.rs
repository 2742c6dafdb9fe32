//! Text oracle: the language model that writes SQL and summaries.
//!
//! Callers own the fallbacks; an oracle only reports failure.

use crate::config::OracleConfig;
use crate::error::ServerError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A single chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPrompt {
    /// System message.
    pub system: String,

    /// User message.
    pub user: String,

    /// Completion token cap.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,
}

/// Produces text from a system prompt and a user prompt.
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Return the completion text, trimmed.
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, ServerError>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiOracle {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiOracle {
    /// Create a client from configuration.
    ///
    /// Without an API key every call fails with an oracle error.
    pub fn new(config: &OracleConfig) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServerError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Whether an API key is configured.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl TextOracle for OpenAiOracle {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, ServerError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServerError::oracle("OPENAI_API_KEY is not set"))?;

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            max_tokens: Some(prompt.max_tokens),
            temperature: Some(prompt.temperature),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting completion from {} ({})", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServerError::oracle(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(ServerError::oracle(format!("{} ({})", message, status.as_u16())));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ServerError::oracle(format!("Failed to parse response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ServerError::oracle("Response contained no completion"))
    }
}

impl fmt::Debug for OpenAiOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiOracle")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> ChatPrompt {
        ChatPrompt {
            system: "system".to_string(),
            user: "user".to_string(),
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let oracle = OpenAiOracle::new(&OracleConfig::default()).unwrap();
        assert!(!oracle.is_enabled());

        let err = oracle.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, ServerError::Oracle(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = OracleConfig {
            api_key: Some("sk-secret".to_string()),
            ..OracleConfig::default()
        };
        let oracle = OpenAiOracle::new(&config).unwrap();
        let debug = format!("{:?}", oracle);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            max_tokens: Some(500),
            temperature: Some(0.0),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 500);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"SELECT 1"},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"total_tokens":2}}"#;
        let response: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content, "SELECT 1");

        let error = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#;
        let parsed: ApiError = serde_json::from_str(error).unwrap();
        assert_eq!(parsed.error.message, "Invalid API key");
    }
}
