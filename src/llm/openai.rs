//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol
//! (OpenAI, Azure-style proxies, local gateways).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmSettings;
use crate::error::{DbQueryError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Builds the client configuration from resolved settings.
    ///
    /// Fails when no API key is configured.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Ok(Self {
            base_url: settings.base_url.clone(),
            api_key: settings.require_api_key()?.to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: settings.timeout,
        })
    }

    /// Full URL of the chat completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// OpenAI LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new OpenAI client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DbQueryError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Creates a client from resolved settings.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Self::new(OpenAiConfig::from_settings(settings)?)
    }

    /// Converts internal messages to OpenAI API format.
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Builds the error for a non-2xx response.
    ///
    /// The API's own error message is used when the body carries one.
    fn parse_error(status: reqwest::StatusCode, body: &str) -> DbQueryError {
        let detail = serde_json::from_str::<OpenAiErrorResponse>(body)
            .map(|r| r.error.message)
            .unwrap_or_else(|_| body.trim().to_string());

        DbQueryError::llm(format!(
            "LLM request failed with status {}: {}",
            status.as_u16(),
            detail
        ))
    }

    fn request_error(error: reqwest::Error) -> DbQueryError {
        if error.is_timeout() {
            DbQueryError::timeout("LLM request timed out")
        } else if error.is_connect() {
            DbQueryError::llm(format!("Failed to connect to LLM API: {}", error))
        } else {
            DbQueryError::llm(format!("LLM request failed: {}", error))
        }
    }

    /// Extracts the first choice's content from a success body.
    fn parse_response(body: &str) -> Result<String> {
        let response: OpenAiResponse = serde_json::from_str(body)
            .map_err(|e| DbQueryError::llm(format!("Failed to parse LLM response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DbQueryError::llm("LLM response has no choices"))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(model = %self.config.model, "sending chat completion request");

        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DbQueryError::llm(format!("Failed to read LLM response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::parse_error(status, &body));
        }

        Self::parse_response(&body)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
