//! Chat platform adapters.
//!
//! The [`traits`] module defines the platform-neutral contracts the core
//! consumes; [`discord`] implements them over the Discord Gateway WebSocket
//! and REST API.

pub mod discord;
pub mod traits;

pub use discord::DiscordChannel;
pub use traits::{
    ChannelError, ChannelKind, ChannelResult, InboundAttachment, InboundEvent, Transport,
};
