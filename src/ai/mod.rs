use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

mod error;
pub mod prompt;
pub mod response;

pub use error::AIError;
pub use prompt::{build_retry_request, build_system_prompt};
pub use response::{parse_command_response, CommandRequest, ParseError};

use crate::config::{AIConfig, AIProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The language model as seen by the assistant loop: one system message,
/// one user message, one textual reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, AIError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

/// HTTP client for OpenAI-compatible chat completions (Groq, OpenAI) and the
/// Anthropic messages API.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    config: AIConfig,
}

impl HttpCompletionClient {
    pub fn new(config: AIConfig) -> Result<Self, AIError> {
        if config.api_key().is_none() {
            return Err(AIError::ConfigError(format!(
                "{:?} API key not configured",
                config.provider
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AIError::ConfigError(format!("Could not build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self) -> &str {
        self.config
            .api_url
            .as_deref()
            .unwrap_or_else(|| self.config.provider.default_api_url())
    }

    fn headers(&self) -> Result<HeaderMap, AIError> {
        let api_key = self
            .config
            .api_key()
            .ok_or_else(|| AIError::ConfigError("API key not configured".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match self.config.provider {
            AIProvider::Anthropic => {
                headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(api_key)
                        .map_err(|e| AIError::ConfigError(format!("Invalid API key: {}", e)))?,
                );
            }
            AIProvider::Groq | AIProvider::OpenAI => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", api_key))
                        .map_err(|e| AIError::ConfigError(format!("Invalid API key: {}", e)))?,
                );
            }
        }
        Ok(headers)
    }

    fn request_body(&self, system_prompt: &str, user_message: &str) -> serde_json::Value {
        match self.config.provider {
            AIProvider::Anthropic => json!({
                "model": &self.config.model,
                "max_tokens": self.config.max_tokens,
                "temperature": self.config.temperature,
                "system": system_prompt,
                "messages": [
                    { "role": "user", "content": user_message }
                ]
            }),
            AIProvider::Groq | AIProvider::OpenAI => json!({
                "model": &self.config.model,
                "max_tokens": self.config.max_tokens,
                "temperature": self.config.temperature,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_message }
                ]
            }),
        }
    }

    fn extract_text(&self, body: &str) -> Result<String, AIError> {
        let text = match self.config.provider {
            AIProvider::Anthropic => {
                let response: AnthropicResponse = serde_json::from_str(body).map_err(|e| {
                    AIError::ParseError(format!("{} - Raw response: {}", e, body))
                })?;
                response.content.into_iter().next().map(|c| c.text)
            }
            AIProvider::Groq | AIProvider::OpenAI => {
                let response: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
                    AIError::ParseError(format!("{} - Raw response: {}", e, body))
                })?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
            }
        };

        text.filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AIError::ParseError(format!("Empty response from model: {}", body)))
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, AIError> {
        tracing::debug!(
            provider = ?self.config.provider,
            model = %self.config.model,
            "sending completion request"
        );

        let response = self
            .client
            .post(self.api_url())
            .headers(self.headers()?)
            .json(&self.request_body(system_prompt, user_message))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => (),
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AIError::RateLimitError("Rate limit exceeded".to_string()));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AIError::AuthenticationError("Invalid API key".to_string()));
            }
            status => {
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Could not read error response".to_string());
                return Err(AIError::APIError(format!(
                    "Unexpected status code: {} - Response: {}",
                    status, error_body
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| AIError::NetworkError(format!("Failed to read response body: {}", e)))?;
        tracing::debug!(response = %body, "raw completion response");

        self.extract_text(&body)
    }
}
