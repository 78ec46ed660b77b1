//! # Chat Source Collaborator
//!
//! The runtime never talks to the network directly. Everything it needs from
//! the remote chat service is expressed through the [`ChatSource`] trait, and
//! the polling engine treats every call as fallible: a failed fetch is logged,
//! state is preserved, and the fetch is retried on the next tick.
//!
//! Implementations own their request timeouts; the core imposes none.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Broadcast, ChatMessage, MessagePage, Subscription};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("remote call failed: {0}")]
    Remote(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Remote chat/broadcast API contract consumed by the runtime.
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Fetches the currently active broadcast, if the channel is live.
    async fn fetch_active_broadcast(&self) -> SourceResult<Broadcast>;

    /// Fetches messages newer than the given pagination cursor for a chat
    /// channel. Items are ordered oldest to newest.
    async fn fetch_new_messages(
        &self,
        channel_id: &str,
        page_token: Option<&str>,
    ) -> SourceResult<MessagePage>;

    /// Fetches the current set of channel subscriptions.
    async fn fetch_subscriptions(&self) -> SourceResult<Vec<Subscription>>;

    /// Posts a message to a chat channel.
    async fn send_message(&self, channel_id: &str, text: &str) -> SourceResult<ChatMessage>;
}
