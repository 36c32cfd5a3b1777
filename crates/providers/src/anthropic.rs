//! Streaming client for the Anthropic Messages API.

use crate::sse::{turn_stream, DEFAULT_IDLE_TIMEOUT};
use crate::traits::{ModelTransport, TransportError, TurnStream};
use crate::types::CompletionRequest;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: String,
    /// Re-sends allowed before the first streamed byte.
    pub max_retries: u32,
    pub connect_timeout: Duration,
    /// Longest silence tolerated between streamed events.
    pub idle_timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_retries: 2,
            connect_timeout: Duration::from_secs(15),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Opens one streamed `/v1/messages` request per call.
#[derive(Clone)]
pub struct AnthropicClient {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    async fn open(&self, request: &CompletionRequest) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

fn retry_delay(attempt: u32, err: &TransportError) -> Duration {
    match err {
        TransportError::Api { status: 429, .. } => {
            Duration::from_secs(2_u64.saturating_pow(attempt + 1).min(30))
        }
        _ => Duration::from_millis(250_u64.saturating_mul(2_u64.saturating_pow(attempt)).min(5000)),
    }
}

#[async_trait]
impl ModelTransport for AnthropicClient {
    async fn stream(&self, mut request: CompletionRequest) -> Result<TurnStream, TransportError> {
        request.stream = true;
        debug!(
            "messages request model={} messages={} tools={}",
            request.model,
            request.messages.len(),
            request.tools.len()
        );

        let mut attempt = 0;
        loop {
            match self.open(&request).await {
                Ok(response) => {
                    return Ok(turn_stream(response.bytes_stream(), self.config.idle_timeout))
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = retry_delay(attempt, &e);
                    warn!("Model request failed (attempt {}): {}", attempt + 1, e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        "Anthropic Messages"
    }
}
