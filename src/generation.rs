//! Client for the remote text-generation service.
//!
//! Speaks the Gemini `generateContent` API: one user turn in, the first
//! candidate's text out.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Reply used when the service answers without any candidate text.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't generate a response.";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Generation client configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// API base URL (default: https://generativelanguage.googleapis.com)
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key, sent as the `key` query parameter
    pub api_key: String,
    /// Upper bound for one round-trip
    pub timeout: Duration,
}

impl GenerationConfig {
    /// Create a new generation configuration.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the generateContent endpoint URL (without the key).
    pub fn generate_url(&self) -> String {
        format!(
            "{}/v1/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Generation client error types.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Client construction failed
    #[error("generation client config error: {0}")]
    Config(String),
    /// No response within the configured timeout
    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),
    /// Network/HTTP error
    #[error("generation network error: {0}")]
    Network(String),
    /// Server returned an error response
    #[error("generation server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// Response body was not the expected JSON
    #[error("generation response could not be decoded: {0}")]
    Serialization(String),
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GenerationError::Timeout(_))
    }
}

/// Anything that turns a prompt into a reply.
pub trait TextGenerator: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
}

impl GenerateRequest {
    /// A single user turn.
    pub fn user_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// HTTP client for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GenerationConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new generation client.
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn map_send_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.config.timeout)
        } else {
            GenerationError::Network(e.to_string())
        }
    }
}

impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.config.generate_url())
            .query(&[("key", self.config.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&GenerateRequest::user_prompt(prompt))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            tracing::error!("Generation service returned error {}: {}", status, body);
            return Err(GenerationError::Server {
                status: status.as_u16(),
                message: body,
            });
        }

        tracing::debug!(raw = %body, "generation service response");

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Undecodable generation response: {}", body);
            GenerationError::Serialization(e.to_string())
        })?;

        Ok(parsed
            .first_text()
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_REPLY.to_string()))
    }
}
