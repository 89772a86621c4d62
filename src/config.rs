//! Environment-provided configuration.
//!
//! Everything the bot needs is read once at startup from environment
//! variables. Required variables fail fast with a descriptive error; the
//! rest carry defaults matching the bot's long-standing behavior.

use anyhow::{ensure, Context, Result};
use std::path::PathBuf;

/// Default completion model.
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";
/// Default per-user history bound.
pub const DEFAULT_MAX_HISTORY: usize = 30;
/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
/// Default output token cap.
pub const DEFAULT_MAX_TOKENS: i64 = 1024;
/// Default outbound chunk bound, in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1700;
/// Default durable history document.
pub const DEFAULT_HISTORY_PATH: &str = "memory.json";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Groq API key (`GROQ_API_KEY`, required)
    pub groq_api_key: String,
    /// Discord bot token (`DISCORD_BOT_TOKEN`, required)
    pub discord_bot_token: String,
    /// Per-user history bound; `0` disables history (`MAX_HISTORY`)
    pub max_history: usize,
    /// Restrict handling to one channel (`CHANNEL_ID`, optional)
    pub allowed_channel: Option<String>,
    /// Completion model identifier (`MODEL`)
    pub model: String,
    /// Sampling temperature (`TEMPERATURE`)
    pub temperature: f64,
    /// Output token cap (`MAX_TOKENS`)
    pub max_tokens: i64,
    /// Outbound chunk bound in characters (`MAX_CHUNK_CHARS`)
    pub max_chunk_chars: usize,
    /// System directive prepended to every prompt (`SYSTEM_PROMPT`, optional)
    pub system_prompt: Option<String>,
    /// Durable history document path (`HISTORY_PATH`)
    pub history_path: PathBuf,
    /// Base log level (`LOG_LEVEL`)
    pub log_level: String,
    /// Log output format, `pretty` or `json` (`LOG_FORMAT`)
    pub log_format: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{key} is not set"))
        };

        let max_history = match lookup("MAX_HISTORY") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("MAX_HISTORY must be a non-negative integer, got {raw:?}"))?,
            None => DEFAULT_MAX_HISTORY,
        };

        let temperature = match lookup("TEMPERATURE") {
            Some(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("TEMPERATURE must be a number, got {raw:?}"))?,
            None => DEFAULT_TEMPERATURE,
        };

        let max_tokens = match lookup("MAX_TOKENS") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("MAX_TOKENS must be an integer, got {raw:?}"))?,
            None => DEFAULT_MAX_TOKENS,
        };

        let max_chunk_chars = match lookup("MAX_CHUNK_CHARS") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("MAX_CHUNK_CHARS must be a positive integer, got {raw:?}"))?,
            None => DEFAULT_MAX_CHUNK_CHARS,
        };
        ensure!(max_chunk_chars > 0, "MAX_CHUNK_CHARS must be greater than zero");

        Ok(Self {
            groq_api_key: required("GROQ_API_KEY")?,
            discord_bot_token: required("DISCORD_BOT_TOKEN")?,
            max_history,
            allowed_channel: lookup("CHANNEL_ID").filter(|v| !v.is_empty()),
            model: lookup("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            max_tokens,
            max_chunk_chars,
            system_prompt: lookup("SYSTEM_PROMPT").filter(|v| !v.is_empty()),
            history_path: lookup("HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH)),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
        })
    }
}
