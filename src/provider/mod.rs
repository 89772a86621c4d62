//! Completion backend abstraction.
//!
//! The router calls the backend through [`CompletionBackend`]; the concrete
//! Groq implementation lives in [`groq`]. Any failure is surfaced as a
//! [`BackendError`] and treated as non-retryable for the current turn.

mod groq;

pub use groq::GroqBackend;

use crate::history::ConversationTurn;
use async_trait::async_trait;

/// Completion backend error type.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request never produced a response.
    #[error("Completion request failed: {0}")]
    Transport(String),

    /// The API answered with a non-success status (includes quota
    /// exhaustion).
    #[error("Completion API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response arrived but could not be understood.
    #[error("Malformed completion response: {0}")]
    Malformed(String),
}

/// One completion call: ordered messages plus generation parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Messages in prompt order (system directive first, when present)
    pub messages: Vec<ConversationTurn>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Output token cap
    pub max_tokens: i64,
}

/// Synchronous request/response interface to a hosted completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name (e.g., "groq").
    fn name(&self) -> &str;

    /// Generate a reply for the given messages.
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError>;
}
