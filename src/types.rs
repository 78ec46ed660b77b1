use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message as delivered by the remote source.
///
/// Messages are immutable once fetched; the runtime only ever reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Source-assigned message id, unique per channel.
    pub id: String,
    /// Stable identifier of the author, used as the wallet/cooldown key.
    pub author_id: String,
    /// Display name of the author at the time of posting.
    pub author_name: String,
    /// Raw display text of the message.
    pub text: String,
    pub published_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(id: &str, author_id: &str, author_name: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            text: text.to_string(),
            published_at: Utc::now(),
        }
    }
}

/// An active broadcast (live stream) discovered by polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: String,
    /// Identifier of the chat channel attached to this broadcast.
    /// Chat polling cannot run until this is known.
    pub chat_channel_id: String,
    pub title: String,
}

/// A channel subscription record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub subscriber_id: String,
    pub subscriber_name: String,
}

/// One page of chat messages returned by the source, oldest first,
/// together with the cursor for the next fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    pub items: Vec<ChatMessage>,
    pub next_page_token: Option<String>,
}
