//! Groq completion backend.
//!
//! Groq speaks the OpenAI-compatible `/v1/chat/completions` format, so the
//! wire types here mirror that shape. The base URL is overridable for
//! testing against a local mock server.

use super::{BackendError, CompletionBackend, CompletionRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default Groq API endpoint.
const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

/// Groq API backend.
pub struct GroqBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GroqBackend {
    /// Create a backend against the public Groq endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, GROQ_BASE_URL)
    }

    /// Create a backend against a custom endpoint (tests, proxies).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for GroqBackend {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);

        let wire = WireRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|turn| WireMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed("response contained no choices".into()))?;

        tracing::debug!(
            model = %request.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "Completion call finished"
        );

        Ok(content)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    max_tokens: i64,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: String,
}
