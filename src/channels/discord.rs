//! Discord transport adapter.
//!
//! Inbound messages arrive over the Gateway WebSocket in real time; outbound
//! operations (messages, reactions, typing indicator) go through the REST
//! API. Gateway events are converted to the platform-neutral
//! [`InboundEvent`] shape before anything else sees them.

use crate::channels::traits::{
    ChannelError, ChannelKind, ChannelResult, InboundAttachment, InboundEvent,
};
use crate::channels::Transport;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

/// Discord REST API base.
const DISCORD_API: &str = "https://discord.com/api/v10";

/// GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT | DIRECT_MESSAGES
const GATEWAY_INTENTS: u64 = 33281;

/// Discord channel using the Gateway WebSocket for inbound messages and the
/// REST API for outbound operations.
pub struct DiscordChannel {
    bot_token: String,
    client: Client,
    bot_user_id: Option<String>,
}

impl DiscordChannel {
    /// Create a new Discord channel. Call [`DiscordChannel::init`] before
    /// listening.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            client: Client::new(),
            bot_user_id: None,
        }
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Verify the token and discover the bot's own user ID.
    pub async fn init(&mut self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(format!("{DISCORD_API}/users/@me"))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::Auth(format!("Failed to verify Discord token: {e}")))?;

        if !resp.status().is_success() {
            return Err(ChannelError::Auth("Invalid Discord bot token".into()));
        }

        let me: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Auth(format!("Invalid identity response: {e}")))?;

        let id = me
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::Auth("Identity response missing user id".into()))?;

        self.bot_user_id = Some(id.to_string());
        tracing::info!(bot_user_id = %id, "Discord channel initialized");
        Ok(())
    }

    /// Connect to the Gateway and deliver every `MESSAGE_CREATE` as an
    /// [`InboundEvent`] to `callback`.
    ///
    /// Returns when the Gateway closes the connection; the caller decides
    /// whether to reconnect.
    pub async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(InboundEvent) + Send + Sync + 'static,
    {
        let bot_user_id = self.bot_user_id.clone().unwrap_or_default();

        // Get Gateway URL
        let gw_resp: Value = self
            .client
            .get(format!("{DISCORD_API}/gateway/bot"))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to get gateway: {e}")))?
            .json()
            .await
            .map_err(|e| ChannelError::Connection(format!("Invalid gateway response: {e}")))?;

        let gw_url = gw_resp
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("wss://gateway.discord.gg");

        let ws_url = format!("{gw_url}/?v=10&encoding=json");
        tracing::info!("Discord: connecting to gateway...");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| ChannelError::Connection(format!("WebSocket connection failed: {e}")))?;

        let (mut write, mut read) = ws_stream.split();

        // Read Hello (opcode 10)
        let hello = read
            .next()
            .await
            .ok_or_else(|| ChannelError::Connection("No hello from gateway".into()))?
            .map_err(|e| ChannelError::Connection(format!("WebSocket error: {e}")))?;

        let hello_data: Value = serde_json::from_str(&hello.to_string())
            .map_err(|e| ChannelError::Connection(format!("Invalid hello: {e}")))?;

        let heartbeat_interval = hello_data
            .get("d")
            .and_then(|d| d.get("heartbeat_interval"))
            .and_then(Value::as_u64)
            .unwrap_or(41250);

        // Send Identify (opcode 2)
        let identify = json!({
            "op": 2,
            "d": {
                "token": self.bot_token,
                "intents": GATEWAY_INTENTS,
                "properties": {
                    "os": "linux",
                    "browser": "murmur",
                    "device": "murmur"
                }
            }
        });

        write
            .send(Message::Text(identify.to_string()))
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to identify: {e}")))?;

        tracing::info!("Discord: connected and identified");

        // Spawn heartbeat task
        let (hb_tx, mut hb_rx) = tokio::sync::mpsc::channel::<()>(1);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(heartbeat_interval));
            loop {
                interval.tick().await;
                if hb_tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                _ = hb_rx.recv() => {
                    let hb = json!({"op": 1, "d": null});
                    if write.send(Message::Text(hb.to_string())).await.is_err() {
                        break;
                    }
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(Message::Text(t))) => t,
                        Some(Ok(Message::Close(_))) | None => break,
                        _ => continue,
                    };

                    let frame: Value = match serde_json::from_str(&msg) {
                        Ok(f) => f,
                        Err(_) => continue,
                    };

                    let event_type = frame.get("t").and_then(Value::as_str).unwrap_or("");
                    if event_type != "MESSAGE_CREATE" {
                        continue;
                    }

                    let Some(d) = frame.get("d") else {
                        continue;
                    };

                    let Some((mut event, refs)) = parse_message_create(d, &bot_user_id) else {
                        continue;
                    };

                    // Fetch the first plain-text attachment's contents; the
                    // router only ever merges that one.
                    if let Some(first) = refs.first() {
                        if first.filename.ends_with(".txt") {
                            if let Some(content) = self.fetch_attachment(&first.url).await {
                                if let Some(slot) = event.attachments.first_mut() {
                                    slot.content = content;
                                }
                            }
                        }
                    }

                    tracing::info!(
                        channel = "discord",
                        trace_id = %event.trace_id,
                        user_id = %event.author_id,
                        chat_id = %event.channel_id,
                        "IM message received"
                    );

                    callback(event);
                }
            }
        }

        Ok(())
    }

    async fn fetch_attachment(&self, url: &str) -> Option<Vec<u8>> {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.bytes().await.ok().map(|b| b.to_vec())
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Attachment fetch rejected");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Attachment fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl Transport for DiscordChannel {
    async fn send_text(&self, channel_id: &str, text: &str) -> ChannelResult<String> {
        let url = format!("{DISCORD_API}/channels/{channel_id}/messages");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&json!({ "content": text }))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Discord send error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "Discord API error ({status}): {error}"
            )));
        }

        let msg_data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Failed to parse response: {e}")))?;

        Ok(msg_data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        symbol: &str,
    ) -> ChannelResult<()> {
        let emoji = urlencoding::encode(symbol);
        let url = format!(
            "{DISCORD_API}/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"
        );

        let resp = self
            .client
            .put(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Discord reaction error: {e}")))?;

        if !resp.status().is_success() {
            return Err(ChannelError::SendFailed(format!(
                "Discord reaction rejected ({})",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn start_typing(&self, channel_id: &str) -> ChannelResult<()> {
        let url = format!("{DISCORD_API}/channels/{channel_id}/typing");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Discord typing error: {e}")))?;

        if !resp.status().is_success() {
            return Err(ChannelError::SendFailed(format!(
                "Discord typing rejected ({})",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Remote attachment reference from a `MESSAGE_CREATE` payload.
#[derive(Debug, Clone)]
struct AttachmentRef {
    filename: String,
    url: String,
}

/// Convert a `MESSAGE_CREATE` data payload into an [`InboundEvent`] plus the
/// attachment references still to be fetched.
///
/// No filtering happens here beyond structural validity; classification is
/// the router's job.
fn parse_message_create(d: &Value, bot_user_id: &str) -> Option<(InboundEvent, Vec<AttachmentRef>)> {
    let author = d.get("author")?;
    let author_id = author.get("id").and_then(Value::as_str)?.to_string();
    let author_name = author
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let author_is_bot = author
        .get("bot")
        .and_then(Value::as_bool)
        .unwrap_or(false)
        || author_id == bot_user_id;

    let channel_id = d.get("channel_id").and_then(Value::as_str)?.to_string();
    let message_id = d.get("id").and_then(Value::as_str)?.to_string();

    // DM payloads carry no guild_id.
    let channel_kind = if d.get("guild_id").and_then(Value::as_str).is_some() {
        ChannelKind::Group
    } else {
        ChannelKind::Direct
    };

    let mentions_bot = d
        .get("mentions")
        .and_then(Value::as_array)
        .is_some_and(|mentions| {
            mentions
                .iter()
                .any(|m| m.get("id").and_then(Value::as_str) == Some(bot_user_id))
        });

    let mentions_everyone = d
        .get("mention_everyone")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let body = d
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let mut attachments = Vec::new();
    let mut refs = Vec::new();
    if let Some(raw) = d.get("attachments").and_then(Value::as_array) {
        for entry in raw {
            let filename = entry
                .get("filename")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let url = entry
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            attachments.push(InboundAttachment {
                filename: filename.clone(),
                content: Vec::new(),
            });
            refs.push(AttachmentRef { filename, url });
        }
    }

    Some((
        InboundEvent {
            message_id,
            channel_id,
            author_id,
            author_name,
            author_is_bot,
            channel_kind,
            mentions_bot,
            mentions_everyone,
            body,
            attachments,
            timestamp: chrono::Utc::now().timestamp_millis(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        },
        refs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_payload() -> Value {
        json!({
            "id": "msg-1",
            "channel_id": "chan-1",
            "guild_id": "guild-1",
            "content": "<@999> hello bot",
            "mention_everyone": false,
            "author": {"id": "user-1", "username": "alice", "bot": false},
            "mentions": [{"id": "999"}],
            "attachments": [
                {"filename": "notes.txt", "url": "https://cdn.example/notes.txt"},
                {"filename": "image.png", "url": "https://cdn.example/image.png"}
            ]
        })
    }

    #[test]
    fn parses_guild_message() {
        let (event, refs) = parse_message_create(&message_payload(), "999").unwrap();

        assert_eq!(event.message_id, "msg-1");
        assert_eq!(event.channel_id, "chan-1");
        assert_eq!(event.author_id, "user-1");
        assert_eq!(event.author_name, "alice");
        assert!(!event.author_is_bot);
        assert_eq!(event.channel_kind, ChannelKind::Group);
        assert!(event.mentions_bot);
        assert!(!event.mentions_everyone);
        assert_eq!(event.body, "<@999> hello bot");
        assert_eq!(event.attachments.len(), 2);
        assert_eq!(refs[0].filename, "notes.txt");
        assert_eq!(refs[0].url, "https://cdn.example/notes.txt");
    }

    #[test]
    fn missing_guild_id_means_direct_message() {
        let mut payload = message_payload();
        payload.as_object_mut().unwrap().remove("guild_id");

        let (event, _) = parse_message_create(&payload, "999").unwrap();
        assert_eq!(event.channel_kind, ChannelKind::Direct);
    }

    #[test]
    fn unmentioned_bot_is_detected() {
        let (event, _) = parse_message_create(&message_payload(), "other-bot").unwrap();
        assert!(!event.mentions_bot);
    }

    #[test]
    fn own_message_is_flagged_as_bot_authored() {
        let (event, _) = parse_message_create(&message_payload(), "user-1").unwrap();
        assert!(event.author_is_bot);
    }

    #[test]
    fn bot_account_author_is_flagged() {
        let mut payload = message_payload();
        payload["author"]["bot"] = json!(true);

        let (event, _) = parse_message_create(&payload, "999").unwrap();
        assert!(event.author_is_bot);
    }

    #[test]
    fn broadcast_flag_is_carried() {
        let mut payload = message_payload();
        payload["mention_everyone"] = json!(true);

        let (event, _) = parse_message_create(&payload, "999").unwrap();
        assert!(event.mentions_everyone);
    }

    #[test]
    fn payload_without_author_is_rejected() {
        let payload = json!({"id": "x", "channel_id": "y", "content": "hi"});
        assert!(parse_message_create(&payload, "999").is_none());
    }

    #[test]
    fn uninitialized_channel_has_no_bot_id() {
        let channel = DiscordChannel::new("fake-token");
        assert!(channel.bot_user_id.is_none());
    }
}
