//! Chat backend port used by the curation engine.
//!
//! The engine only needs a handful of operations from the chat platform:
//! post text and files, attach reactions, re-read the live reaction counts of
//! a message, and receive reaction events one at a time. [`crate::discord`]
//! implements them against Discord; tests use an in-memory backend.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

/// Someone added `emoji` to a watched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub emoji: String,
    pub user: UserId,
}

/// Live reaction counter on a message, the bot's own reaction included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: u32,
}

/// Single-consumer feed of reaction events for one message. Dropping the
/// receiver stops the producer.
pub type ReactionFeed = mpsc::Receiver<Result<ReactionEvent, TransportError>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("channel {0} not found or not a text channel")]
    ChannelNotFound(String),

    #[error("could not read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reaction feed closed")]
    FeedClosed,

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    type Connection: ChatConnection;

    /// Connects and resolves the target channel.
    async fn connect(&self, channel: &ChannelId) -> Result<Self::Connection, TransportError>;
}

/// An open connection bound to one channel. Owned by exactly one session.
#[async_trait]
pub trait ChatConnection: Send {
    fn bot_user(&self) -> &UserId;

    async fn send_text(&mut self, text: &str) -> Result<MessageId, TransportError>;

    /// Uploads the file at `path` as an attachment.
    async fn send_file(&mut self, path: &Path) -> Result<MessageId, TransportError>;

    async fn add_reaction(&mut self, message: &MessageId, emoji: &str)
    -> Result<(), TransportError>;

    /// Reads the current reaction counters of `message` from the platform.
    async fn fetch_reactions(
        &mut self,
        message: &MessageId,
    ) -> Result<Vec<ReactionCount>, TransportError>;

    /// Starts delivering reactions added to `message`.
    async fn subscribe_reactions(
        &mut self,
        message: &MessageId,
    ) -> Result<ReactionFeed, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
