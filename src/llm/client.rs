//! Anthropic Messages API client.
//!
//! One HTTP attempt per call: retry, timeout, fallback and circuit breaking
//! are layered on by the engine.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use super::parsers::{parse_code_fix, parse_diagnosis};
use super::prompts::{diagnosis_prompt, fix_prompt, DIAGNOSIS_SYSTEM, FIX_SYSTEM};
use super::types::{ApiRequest, ApiResponse, ApiUsage};
use crate::config::{ModelConfig, SecretString};
use crate::error::{ConfigError, ModelError};
use crate::traits::{CodeFix, Diagnosis, DiagnosisRequest, FixRequest, ModelClient};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Token cap for diagnosis answers.
const DIAGNOSIS_MAX_TOKENS: u32 = 2048;
/// Token cap for code fix answers, which carry a whole file.
const FIX_MAX_TOKENS: u32 = 16_384;
/// Maximum prompt size in characters.
pub const MAX_CONTENT_LENGTH: usize = 400_000;

/// Text answer plus reported usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Concatenated text blocks.
    pub text: String,
    /// Token usage.
    pub usage: ApiUsage,
}

/// Anthropic API client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    timeout_ms: u64,
}

impl AnthropicClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Network`] if the HTTP client cannot be built.
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        timeout_ms: u64,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ModelError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_ms,
        })
    }

    /// Create a client from model configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequired`] without an API key.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ConfigError> {
        let key = config.require_api_key()?.clone();
        Self::new(key, config.base_url.clone(), config.request_timeout_ms).map_err(|e| {
            ConfigError::InvalidValue {
                var: "ANTHROPIC_BASE_URL".into(),
                reason: e.to_string(),
            }
        })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one completion request.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] classified by HTTP status, or on transport failure.
    pub async fn complete(&self, request: &ApiRequest) -> Result<Completion, ModelError> {
        let size = request.content_len();
        if size > MAX_CONTENT_LENGTH {
            return Err(ModelError::InvalidRequest {
                message: format!("Prompt too large: {size} > {MAX_CONTENT_LENGTH}"),
            });
        }

        let url = format!("{}/messages", self.base_url);
        let start = Instant::now();
        debug!(url = %url, model = %request.model, max_tokens = request.max_tokens, "Starting Anthropic API request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                if e.is_timeout() {
                    error!(url = %url, elapsed_ms, timeout_ms = self.timeout_ms, "Anthropic API request timed out");
                    ModelError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    error!(url = %url, elapsed_ms, error = %e, "Anthropic API request failed");
                    ModelError::Network {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        debug!(status = %status, elapsed_ms = ?start.elapsed(), "Anthropic API response received");

        match status.as_u16() {
            401 => return Err(ModelError::AuthenticationFailed),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                return Err(ModelError::RateLimited {
                    retry_after_seconds: retry_after,
                });
            }
            529 => {
                return Err(ModelError::ModelOverloaded {
                    model: request.model.clone(),
                })
            }
            _ => {}
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::UnexpectedResponse {
                message: format!("Status {status}: {body}"),
            });
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::UnexpectedResponse {
                message: format!("Failed to parse response: {e}"),
            })?;
        let text = body.text();
        if text.trim().is_empty() {
            return Err(ModelError::UnexpectedResponse {
                message: "No content in response".into(),
            });
        }
        Ok(Completion {
            text,
            usage: body.usage,
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn diagnose(
        &self,
        model: &str,
        request: &DiagnosisRequest,
    ) -> Result<Diagnosis, ModelError> {
        let api = ApiRequest::user(model, DIAGNOSIS_MAX_TOKENS, diagnosis_prompt(request))
            .with_system(DIAGNOSIS_SYSTEM)
            .with_temperature(0.0);
        let completion = self.complete(&api).await?;
        parse_diagnosis(&completion.text)
    }

    async fn generate_fix(
        &self,
        model: &str,
        request: &FixRequest,
    ) -> Result<CodeFix, ModelError> {
        let api = ApiRequest::user(model, FIX_MAX_TOKENS, fix_prompt(request))
            .with_system(FIX_SYSTEM)
            .with_temperature(0.0);
        let completion = self.complete(&api).await?;
        parse_code_fix(&completion.text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AnthropicClient {
        AnthropicClient::new(SecretString::new("test-api-key"), server.uri(), 5_000).unwrap()
    }

    fn success_body(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_123",
            "content": [{"type": "text", "text": text}],
            "model": "claude-3",
            "usage": {"input_tokens": 10, "output_tokens": 20},
            "stop_reason": "end_turn"
        })
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ModelConfig::default();
        assert!(matches!(
            AnthropicClient::from_config(&config),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Hello!")))
            .mount(&server)
            .await;

        let completion = client_for(&server)
            .complete(&ApiRequest::user("claude-3", 100, "Hi"))
            .await
            .unwrap();
        assert_eq!(completion.text, "Hello!");
        assert_eq!(completion.usage.input_tokens, 10);
    }

    #[tokio::test]
    async fn test_diagnose_parses_json_answer() {
        let server = MockServer::start().await;
        let answer = r#"```json
{"root_cause": "missing env", "suggested_fix": "ENV FIX_APPLIED=true", "file_path": "Dockerfile", "confidence": 0.95}
```"#;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body(answer)))
            .mount(&server)
            .await;

        let diagnosis = client_for(&server)
            .diagnose("claude-3", &DiagnosisRequest::new("logs", "ctx"))
            .await
            .unwrap();
        assert_eq!(diagnosis.file_path, "Dockerfile");
        assert_eq!(diagnosis.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_generate_fix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body(
                r#"{"corrected_code": "FROM node:20\n", "explanation": "pin"}"#,
            )))
            .mount(&server)
            .await;

        let fix = client_for(&server)
            .generate_fix("claude-3", &FixRequest::new("Dockerfile", "FROM node", "pin"))
            .await
            .unwrap();
        assert_eq!(fix.corrected_content, "FROM node:20\n");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "busy"))
            .respond_with(ResponseTemplate::new(529))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let call = |key: &'static str| {
            let client = AnthropicClient::new(SecretString::new(key), server.uri(), 5_000).unwrap();
            async move { client.complete(&ApiRequest::user("m", 10, "x")).await }
        };
        assert_eq!(call("bad").await.unwrap_err(), ModelError::AuthenticationFailed);
        assert_eq!(
            call("limited").await.unwrap_err(),
            ModelError::RateLimited {
                retry_after_seconds: 7
            }
        );
        assert!(matches!(
            call("busy").await.unwrap_err(),
            ModelError::ModelOverloaded { .. }
        ));
        let err = call("broken").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_empty_content_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg", "content": [], "usage": {"input_tokens": 1, "output_tokens": 0}
            })))
            .mount(&server)
            .await;
        let err = client_for(&server)
            .complete(&ApiRequest::user("m", 10, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_oversized_prompt_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let big = "x".repeat(MAX_CONTENT_LENGTH + 1);
        let err = client_for(&server)
            .complete(&ApiRequest::user("m", 10, big))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidRequest { .. }));
    }
}
