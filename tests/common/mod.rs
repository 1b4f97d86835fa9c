//! In-memory chat backend and log used to drive curation sessions in tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use reddyt::chat::{
    ChannelId, ChatBackend, ChatConnection, MessageId, ReactionCount, ReactionEvent, ReactionFeed,
    TransportError, UserId,
};
use reddyt::ml_log::{CurationLog, LogError, LogRecord};
use reddyt::{Ballot, Comment, Post};

pub const BOT: &str = "bot-0";

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    File(PathBuf),
}

#[derive(Default)]
struct Shared {
    sent: Vec<(MessageId, Sent)>,
    live: HashMap<String, u32>,
    reacted_on: Vec<(MessageId, String)>,
    feed: Option<ReactionFeed>,
    connects: usize,
    closes: usize,
    fail_reactions: bool,
    fail_texts: Vec<String>,
}

#[derive(Clone)]
pub struct MemoryChat {
    shared: Arc<Mutex<Shared>>,
}

/// Plays the human side: adds reactions to the ballot message.
pub struct Reactor {
    shared: Arc<Mutex<Shared>>,
    tx: mpsc::Sender<Result<ReactionEvent, TransportError>>,
}

pub fn memory_chat() -> (MemoryChat, Reactor) {
    let (tx, rx) = mpsc::channel(64);
    let shared = Arc::new(Mutex::new(Shared {
        feed: Some(rx),
        ..Shared::default()
    }));
    (
        MemoryChat {
            shared: Arc::clone(&shared),
        },
        Reactor { shared, tx },
    )
}

impl MemoryChat {
    pub fn fail_reactions(&self) {
        self.shared.lock().unwrap().fail_reactions = true;
    }

    /// Makes sending `text` fail from now on.
    pub fn fail_text(&self, text: &str) {
        self.shared.lock().unwrap().fail_texts.push(text.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.shared
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                Sent::File(_) => None,
            })
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts().pop()
    }

    /// Emojis the bot attached, with the message they went on.
    pub fn bot_reactions(&self) -> Vec<(MessageId, String)> {
        self.shared.lock().unwrap().reacted_on.clone()
    }

    pub fn message_text(&self, id: &MessageId) -> Option<String> {
        self.shared
            .lock()
            .unwrap()
            .sent
            .iter()
            .find(|(m, _)| m == id)
            .and_then(|(_, s)| match s {
                Sent::Text(t) => Some(t.clone()),
                Sent::File(_) => None,
            })
    }

    pub fn connects(&self) -> usize {
        self.shared.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().unwrap().closes
    }
}

impl Reactor {
    /// Adds a reaction: the live count goes up and an event is delivered.
    pub fn react(&self, emoji: &str, user: &str) {
        self.react_silently(emoji);
        self.event(emoji, user);
    }

    /// Changes the live count without delivering an event, like a reaction
    /// whose gateway event has not arrived yet.
    pub fn react_silently(&self, emoji: &str) {
        *self
            .shared
            .lock()
            .unwrap()
            .live
            .entry(emoji.to_string())
            .or_insert(0) += 1;
    }

    /// Delivers an event without touching the live count. Events sent after
    /// the session dropped its feed go nowhere.
    pub fn event(&self, emoji: &str, user: &str) {
        let _ = self.tx.try_send(Ok(ReactionEvent {
            emoji: emoji.to_string(),
            user: UserId(user.to_string()),
        }));
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .tx
            .try_send(Err(TransportError::Other(message.to_string())));
    }

    pub fn hang_up(self) {
        drop(self.tx);
    }
}

pub struct MemoryConnection {
    shared: Arc<Mutex<Shared>>,
    bot: UserId,
}

impl MemoryConnection {
    fn record(&self, sent: Sent) -> MessageId {
        let mut shared = self.shared.lock().unwrap();
        let id = MessageId(format!("m{}", shared.sent.len()));
        shared.sent.push((id.clone(), sent));
        id
    }
}

#[async_trait]
impl ChatBackend for MemoryChat {
    type Connection = MemoryConnection;

    async fn connect(&self, channel: &ChannelId) -> Result<MemoryConnection, TransportError> {
        if channel.0.is_empty() {
            return Err(TransportError::ChannelNotFound(channel.0.clone()));
        }
        self.shared.lock().unwrap().connects += 1;
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
            bot: UserId(BOT.to_string()),
        })
    }
}

#[async_trait]
impl ChatConnection for MemoryConnection {
    fn bot_user(&self) -> &UserId {
        &self.bot
    }

    async fn send_text(&mut self, text: &str) -> Result<MessageId, TransportError> {
        if self.shared.lock().unwrap().fail_texts.iter().any(|t| t == text) {
            return Err(TransportError::Other(format!("could not send {text:?}")));
        }
        Ok(self.record(Sent::Text(text.to_string())))
    }

    async fn send_file(&mut self, path: &Path) -> Result<MessageId, TransportError> {
        Ok(self.record(Sent::File(path.to_path_buf())))
    }

    async fn add_reaction(
        &mut self,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_reactions {
            return Err(TransportError::Other("reaction rejected".to_string()));
        }
        *shared.live.entry(emoji.to_string()).or_insert(0) += 1;
        shared.reacted_on.push((message.clone(), emoji.to_string()));
        Ok(())
    }

    async fn fetch_reactions(
        &mut self,
        _message: &MessageId,
    ) -> Result<Vec<ReactionCount>, TransportError> {
        let shared = self.shared.lock().unwrap();
        Ok(shared
            .live
            .iter()
            .map(|(emoji, count)| ReactionCount {
                emoji: emoji.clone(),
                count: *count,
            })
            .collect())
    }

    async fn subscribe_reactions(
        &mut self,
        _message: &MessageId,
    ) -> Result<ReactionFeed, TransportError> {
        self.shared
            .lock()
            .unwrap()
            .feed
            .take()
            .ok_or(TransportError::FeedClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.shared.lock().unwrap().closes += 1;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLog {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl CurationLog for MemoryLog {
    fn append(&self, records: &[LogRecord]) -> Result<(), LogError> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}

pub fn ballot(texts: &[&str]) -> Ballot {
    let post = Post {
        text: "What is something everyone should try once?".to_string(),
        id: "128ukfw".to_string(),
        image_ref: Some(PathBuf::from("images/128ukfw.png")),
        nsfw: false,
        score: 1200,
    };
    let comments = texts
        .iter()
        .enumerate()
        .map(|(i, t)| Comment {
            text: t.to_string(),
            post_id: "128ukfw".to_string(),
            comment_id: format!("k{i}"),
            image_ref: Some(PathBuf::from(format!("images/128ukfw_k{i}.png"))),
        })
        .collect();
    Ballot::new(post, comments, "AskReddit")
}
