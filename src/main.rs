//! Murmur - main entry point.

use anyhow::Result;
use murmur::{
    logging, Config, DiscordChannel, GroqBackend, HistoryError, HistoryStore, InboundEvent,
    MessageRouter, RouterOptions,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    logging::init_logging(&config.log_level, &config.log_format);

    tracing::info!("Murmur v{}", env!("CARGO_PKG_VERSION"));

    // Durable history. Corruption is loud but not fatal: the condition is
    // logged and the bot continues with an empty table that overwrites the
    // unreadable document on the first mutation.
    let store = match HistoryStore::open(&config.history_path, config.max_history) {
        Ok(store) => store,
        Err(e @ HistoryError::Corrupt { .. }) => {
            tracing::error!(error = %e, "History store unreadable, continuing with empty table");
            HistoryStore::empty(&config.history_path, config.max_history)
        }
        Err(e) => return Err(e.into()),
    };

    if config.max_history == 0 {
        tracing::warn!("MAX_HISTORY is 0, conversation memory is disabled");
    }

    let backend = Arc::new(GroqBackend::new(&config.groq_api_key));

    let mut channel = DiscordChannel::new(config.discord_bot_token.clone());
    channel.init().await?;
    let channel = Arc::new(channel);

    let router = Arc::new(MessageRouter::new(
        Arc::new(store),
        backend,
        channel.clone(),
        RouterOptions {
            system_prompt: config.system_prompt.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_chunk_chars: config.max_chunk_chars,
            allowed_channel: config.allowed_channel.clone(),
        },
    ));

    let (tx, mut rx) = tokio::sync::mpsc::channel::<InboundEvent>(64);

    // Gateway listener with reconnect. The callback only enqueues; handling
    // happens on the event loop below so a slow turn never blocks the
    // WebSocket reader.
    let gateway = channel.clone();
    let listener = tokio::spawn(async move {
        loop {
            let tx = tx.clone();
            let result = gateway
                .listen(move |event| {
                    if tx.try_send(event).is_err() {
                        tracing::warn!("Inbound queue full, dropping event");
                    }
                })
                .await;

            match result {
                Ok(()) => tracing::warn!("Gateway closed the connection"),
                Err(e) => tracing::error!(error = %e, "Gateway connection failed"),
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            tracing::info!("Reconnecting to gateway");
        }
    });

    // Event loop: one task per inbound event; different users' turns
    // interleave at I/O suspension points while the history store serializes
    // its own mutations.
    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { break };
                let router = router.clone();
                tokio::spawn(async move {
                    let disposition = router.handle(event).await;
                    tracing::debug!(?disposition, "Event handled");
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    listener.abort();
    Ok(())
}
