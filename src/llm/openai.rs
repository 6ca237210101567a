//! OpenAI-compatible chat client.
//!
//! Works against any `/chat/completions` endpoint (OpenAI, LiteLLM proxies,
//! OpenRouter). Enforces a per-call timeout and retries transient failures
//! with exponential backoff before surfacing a classified [`LlmError`].

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, LlmProvider, Message};
use crate::error::LlmError;

/// Default API endpoint when none is configured.
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Per-call request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Client for OpenAI-compatible chat completion APIs.
pub struct OpenAiChatClient {
    http_client: Client,
    api_base: String,
    api_key: Option<String>,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiChatClient {
    /// Create a new client with explicit configuration.
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_timeout(api_base, api_key, REQUEST_TIMEOUT_SECS)
    }

    /// Create a new client with a custom per-call timeout.
    pub fn with_timeout(
        api_base: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .expect("Failed to build HTTP client - system TLS configuration error"),
            api_base: api_base.into(),
            api_key,
            timeout_secs,
            max_retries: MAX_RETRIES,
        }
    }

    /// Create a client from environment variables.
    ///
    /// Reads:
    /// - `OPENAI_API_BASE`: base URL (defaults to the public OpenAI endpoint)
    /// - `OPENAI_API_KEY`: API key (required)
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] if `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base =
            env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::MissingApiKey("OPENAI_API_KEY".to_string()))?;
        Ok(Self::new(api_base, Some(api_key)))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Execute a request with exponential backoff on transient failures.
    async fn execute_with_retry(&self, request: &ApiRequest) -> Result<String, LlmError> {
        let mut last_error = None;
        let url = format!("{}/chat/completions", self.api_base);

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay_ms = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                tracing::debug!(
                    attempt = attempt + 1,
                    delay_ms = delay_ms,
                    "Retrying chat completion after transient failure"
                );
            }

            match self.execute_request(&url, request).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %err,
                        "Transient gateway error, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Transport("retry budget exhausted".to_string())))
    }

    /// Execute a single request (no retry logic).
    async fn execute_request(&self, url: &str, request: &ApiRequest) -> Result<String, LlmError> {
        let mut http_request = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request.json(request).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    seconds: self.timeout_secs,
                }
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            // Prefer the structured error message when the body parses
            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::Api {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse API response: {}", e)))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("Empty completion from backend".to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiChatClient {
    async fn complete(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let model = if request.sampling.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            request.sampling.model.clone()
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: Some(request.sampling.temperature),
            max_tokens: Some(request.sampling.max_tokens),
            seed: request.sampling.seed,
        };

        self.execute_with_retry(&api_request).await
    }
}

/// Internal request structure for the OpenAI-compatible API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

/// Internal response structure from the OpenAI-compatible API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: String,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SamplingConfig;

    #[test]
    fn client_construction() {
        let client = OpenAiChatClient::new("http://localhost:4000", Some("test-key".to_string()));
        assert_eq!(client.api_base(), "http://localhost:4000");
        assert!(client.has_api_key());

        let keyless = OpenAiChatClient::new("http://localhost:4000", None);
        assert!(!keyless.has_api_key());
    }

    #[test]
    fn api_request_skips_unset_fields() {
        let request = ApiRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("hi")],
            temperature: Some(0.2),
            max_tokens: Some(800),
            seed: None,
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"gpt-4o-mini\""));
        assert!(json.contains("\"temperature\":0.2"));
        assert!(!json.contains("seed"));
    }

    #[tokio::test]
    async fn connection_error_is_classified_as_transport() {
        // Port that will not have a server listening
        let client =
            OpenAiChatClient::with_timeout("http://localhost:65535", None, 2);

        let request = GenerationRequest::new(
            "You are terse.",
            "ping",
            SamplingConfig::new("gpt-4o-mini"),
        );
        let result = client.complete(request).await;

        assert!(result.is_err());
        match result.unwrap_err() {
            LlmError::Transport(_) | LlmError::Timeout { .. } => {}
            other => panic!("Expected transport-level error, got {:?}", other),
        }
    }
}
