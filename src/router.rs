//! Inbound event routing.
//!
//! One [`MessageRouter::handle`] call processes one inbound event through an
//! explicit state machine:
//!
//! 1. Filter      - drop bot-authored and broadcast events
//! 2. Classify    - proceed only when the bot is explicitly addressed
//! 3. Normalize   - strip `<...>` inline markup tokens
//! 4. Merge       - fold the first plain-text attachment into the body
//! 5. Reset check - short `RESET` messages clear the user's history
//! 6. Answer      - prompt assembly, completion call, chunked dispatch
//!
//! Failures inside a turn are reported to the user and logged; they never
//! propagate out of `handle`, so one user's bad turn cannot take down the
//! event loop.

use crate::channels::{ChannelKind, InboundEvent, Transport};
use crate::chunker::send_chunked;
use crate::history::{ConversationTurn, HistoryStore, Role};
use crate::prompt;
use crate::provider::{CompletionBackend, CompletionRequest};
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

/// Inline markup tokens (`<@mention>`, `<#channel>`, `<:emoji:123>`, ...)
/// stripped from message bodies before prompting.
static MARKUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Literal token that clears a user's history.
pub const RESET_TOKEN: &str = "RESET";

/// A message containing [`RESET_TOKEN`] only counts as a reset command when
/// it is shorter than this. A long message merely mentioning the word keeps
/// its ordinary meaning.
const RESET_MAX_CHARS: usize = 10;

/// Reaction added to acknowledge a message the bot is going to answer.
pub const ACK_REACTION: &str = "\u{1f4ac}";

/// Terminal state of one handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not addressed to the bot, or filtered out
    Ignored,
    /// History cleared on user request
    Reset,
    /// Answered through the history-enabled path
    Answered,
    /// Answered without reading or mutating history
    AnsweredStateless,
    /// The turn failed; the failure was reported and logged
    Failed,
}

/// Router construction options, typically derived from [`crate::Config`].
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Optional system directive prepended to every prompt
    pub system_prompt: Option<String>,
    /// Completion model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Output token cap
    pub max_tokens: i64,
    /// Outbound chunk bound, in characters
    pub max_chunk_chars: usize,
    /// When set, only events from this channel are handled
    pub allowed_channel: Option<String>,
}

/// The event-driven core: classifies inbound events and orchestrates
/// history, prompt assembly, completion calls and chunked dispatch.
pub struct MessageRouter {
    store: Arc<HistoryStore>,
    backend: Arc<dyn CompletionBackend>,
    transport: Arc<dyn Transport>,
    options: RouterOptions,
}

impl MessageRouter {
    /// Create a router over the given collaborators.
    pub fn new(
        store: Arc<HistoryStore>,
        backend: Arc<dyn CompletionBackend>,
        transport: Arc<dyn Transport>,
        options: RouterOptions,
    ) -> Self {
        Self {
            store,
            backend,
            transport,
            options,
        }
    }

    /// Process one inbound event to a terminal disposition.
    pub async fn handle(&self, event: InboundEvent) -> Disposition {
        // Filter: the bot's own traffic and broadcasts are never handled.
        if event.author_is_bot || event.mentions_everyone {
            return Disposition::Ignored;
        }
        if let Some(ref allowed) = self.options.allowed_channel {
            if event.channel_id != *allowed {
                return Disposition::Ignored;
            }
        }

        // Classify: an explicit mention or a direct message addresses the bot.
        let addressed = event.mentions_bot || event.channel_kind == ChannelKind::Direct;
        if !addressed {
            return Disposition::Ignored;
        }

        // Normalize, then merge the first plain-text attachment.
        let mut text = strip_markup(&event.body);
        if let Some(attachment) = event.attachments.first() {
            if attachment.filename.ends_with(".txt") && !attachment.content.is_empty() {
                text.push('\n');
                text.push_str(&String::from_utf8_lossy(&attachment.content));
            }
        }

        tracing::info!(
            trace_id = %event.trace_id,
            user_id = %event.author_id,
            channel_id = %event.channel_id,
            chars = text.chars().count(),
            "Handling addressed message"
        );

        if is_reset_command(&text) {
            return self.reset(&event).await;
        }

        // Acknowledge: reaction and typing indicator are best-effort.
        if let Err(e) = self
            .transport
            .add_reaction(&event.channel_id, &event.message_id, ACK_REACTION)
            .await
        {
            tracing::warn!(trace_id = %event.trace_id, error = %e, "Reaction failed");
        }
        if let Err(e) = self.transport.start_typing(&event.channel_id).await {
            tracing::warn!(trace_id = %event.trace_id, error = %e, "Typing indicator failed");
        }

        if self.store.max_history() == 0 {
            self.answer_stateless(&event, &text).await
        } else {
            self.answer_with_history(&event, &text).await
        }
    }

    /// Clear the user's history and confirm, without touching the backend.
    async fn reset(&self, event: &InboundEvent) -> Disposition {
        if let Err(e) = self.store.clear(&event.author_id).await {
            tracing::error!(trace_id = %event.trace_id, error = %e, "History clear failed");
            self.report_failure(event).await;
            return Disposition::Failed;
        }

        tracing::info!(
            trace_id = %event.trace_id,
            user_id = %event.author_id,
            "History reset"
        );

        let confirmation = format!("Message history reset for user: {}", event.author_name);
        if let Err(e) = self
            .transport
            .send_text(&event.channel_id, &confirmation)
            .await
        {
            tracing::error!(trace_id = %event.trace_id, error = %e, "Reset confirmation failed");
            return Disposition::Failed;
        }

        Disposition::Reset
    }

    /// History disabled: prompt from the current message alone, no store
    /// reads or writes.
    async fn answer_stateless(&self, event: &InboundEvent, text: &str) -> Disposition {
        let single_turn = [ConversationTurn::new(Role::User, text)];
        let messages = prompt::assemble(self.options.system_prompt.as_deref(), &single_turn);

        let reply = match self.complete(messages).await {
            Ok(reply) => reply,
            Err(disposition) => {
                self.report_failure(event).await;
                return disposition;
            }
        };

        self.dispatch(event, &reply, Disposition::AnsweredStateless)
            .await
    }

    /// History enabled: record the user turn, prompt from the post-append
    /// log, record the assistant turn, dispatch.
    async fn answer_with_history(&self, event: &InboundEvent, text: &str) -> Disposition {
        if let Err(e) = self.store.append(&event.author_id, Role::User, text).await {
            tracing::error!(trace_id = %event.trace_id, error = %e, "User turn persist failed");
            self.report_failure(event).await;
            return Disposition::Failed;
        }

        let log = self.store.get(&event.author_id).await;
        let messages = prompt::assemble(self.options.system_prompt.as_deref(), &log);

        let reply = match self.complete(messages).await {
            Ok(reply) => reply,
            Err(disposition) => {
                // The user's own turn stays in history; only the assistant
                // turn is missing for this failed exchange.
                self.report_failure(event).await;
                return disposition;
            }
        };

        if let Err(e) = self
            .store
            .append(&event.author_id, Role::Assistant, &reply)
            .await
        {
            // The reply exists and the user should see it; the store is
            // merely missing the assistant turn for the next exchange.
            tracing::error!(trace_id = %event.trace_id, error = %e, "Assistant turn persist failed");
        }

        self.dispatch(event, &reply, Disposition::Answered).await
    }

    async fn complete(&self, messages: Vec<ConversationTurn>) -> Result<String, Disposition> {
        let request = CompletionRequest {
            messages,
            model: self.options.model.clone(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        self.backend.complete(request).await.map_err(|e| {
            tracing::error!(backend = self.backend.name(), error = %e, "Completion failed");
            Disposition::Failed
        })
    }

    async fn dispatch(&self, event: &InboundEvent, reply: &str, ok: Disposition) -> Disposition {
        match send_chunked(
            self.transport.as_ref(),
            &event.channel_id,
            reply,
            self.options.max_chunk_chars,
        )
        .await
        {
            Ok(chunks) => {
                tracing::info!(
                    trace_id = %event.trace_id,
                    user_id = %event.author_id,
                    chunks,
                    "Reply dispatched"
                );
                ok
            }
            Err(e) => {
                tracing::error!(trace_id = %event.trace_id, error = %e, "Reply dispatch failed");
                Disposition::Failed
            }
        }
    }

    /// Tell the user their turn failed. Best-effort: a transport that cannot
    /// even deliver the notice only gets a log line.
    async fn report_failure(&self, event: &InboundEvent) {
        let notice = "Something went wrong while answering that, please try again.";
        if let Err(e) = self.transport.send_text(&event.channel_id, notice).await {
            tracing::error!(trace_id = %event.trace_id, error = %e, "Failure notice undeliverable");
        }
    }
}

/// Remove `<...>` inline markup tokens from a message body.
pub fn strip_markup(input: &str) -> String {
    MARKUP_PATTERN.replace_all(input, "").into_owned()
}

/// A reset command contains the literal token and stays under the length
/// gate.
fn is_reset_command(text: &str) -> bool {
    text.contains(RESET_TOKEN) && text.chars().count() < RESET_MAX_CHARS
}
