//! Transport contracts for chat platforms.
//!
//! The router works exclusively against these plain data shapes and the
//! [`Transport`] trait; nothing in the core depends on a platform SDK's
//! object model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for transport operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Transport error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Kind of channel an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// One-on-one direct message
    Direct,
    /// Shared guild/group channel
    Group,
}

/// An attachment carried by an inbound event.
///
/// Content is pre-fetched by the transport adapter for plain-text
/// attachments; other attachment kinds arrive with empty content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundAttachment {
    pub filename: String,
    #[serde(default)]
    pub content: Vec<u8>,
}

/// Platform-neutral inbound message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Platform message ID
    pub message_id: String,
    /// Channel the message arrived on
    pub channel_id: String,
    /// Author's stable user ID
    pub author_id: String,
    /// Author's display name
    pub author_name: String,
    /// Whether the author is a bot account (including this bot itself)
    pub author_is_bot: bool,
    /// Direct message or shared channel
    pub channel_kind: ChannelKind,
    /// Whether this bot is explicitly mentioned
    pub mentions_bot: bool,
    /// Whether the message is a broadcast (@everyone / @here)
    pub mentions_everyone: bool,
    /// Raw message body
    pub body: String,
    /// Attachments, in platform order
    #[serde(default)]
    pub attachments: Vec<InboundAttachment>,
    /// Arrival timestamp (Unix millis)
    pub timestamp: i64,
    /// Trace ID for correlating this event's log lines
    pub trace_id: String,
}

/// Outbound operations a chat platform must provide.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a single text message. Returns the platform message ID.
    async fn send_text(&self, channel_id: &str, text: &str) -> ChannelResult<String>;

    /// Add a reaction symbol to an existing message.
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        symbol: &str,
    ) -> ChannelResult<()>;

    /// Trigger the platform's typing indicator. The indicator is
    /// self-expiring; there is nothing to release.
    async fn start_typing(&self, channel_id: &str) -> ChannelResult<()>;
}
