use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{ChatMessage, CompletionRequest, CompletionResponse};
use crate::{ClientError, Result};

// ─── ServiceConfig ────────────────────────────────────────────────────────

/// Connection settings for the code-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".into()
}

fn default_model() -> String {
    "claude-sonnet-4-5".into()
}

fn default_api_key_env() -> String {
    "ANALYST_API_KEY".into()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_api_version() -> String {
    "2023-06-01".into()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: None,
            request_timeout_secs: default_request_timeout_secs(),
            api_version: default_api_version(),
        }
    }
}

// ─── CompletionBackend ────────────────────────────────────────────────────

/// One round trip to a completion service: prompt text in, reply text out.
///
/// The gateway owns retries, rate limiting and the circuit breaker, so
/// implementations make exactly one attempt per call.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ─── HttpBackend ──────────────────────────────────────────────────────────

pub struct HttpBackend {
    client: reqwest::Client,
    config: ServiceConfig,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Build a client and read the API key from `config.api_key_env`.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "no API key in environment, requests will be sent unauthenticated"
            );
        }
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn request_body(&self, prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![ChatMessage::user(prompt)],
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .header("anthropic-version", &self.config.api_version)
            .json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        debug!(endpoint = %self.config.endpoint, model = %self.config.model, "sending completion request");
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
        if let Some(usage) = &parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "completion received"
            );
        }
        Ok(parsed.text())
    }
}
