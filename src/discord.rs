//! Discord REST implementation of the chat backend.
//!
//! Messages and reactions go through the HTTP API. Reaction events are
//! produced by a poller per watched message that diffs the reactor list of
//! every emoji whose count changed since the previous poll, and of the control
//! glyphs on every poll.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::chat::{
    ChannelId, ChatBackend, ChatConnection, MessageId, ReactionCount, ReactionEvent, ReactionFeed,
    TransportError, UserId,
};
use crate::glyph::Glyph;

pub const API_BASE: &str = "https://discord.com/api/v10";

const FEED_CAPACITY: usize = 64;

// GUILD_TEXT, DM, GROUP_DM, GUILD_ANNOUNCEMENT and the three thread kinds
const TEXT_CHANNEL_KINDS: [u8; 7] = [0, 1, 3, 5, 10, 11, 12];

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    #[serde(rename = "type")]
    kind: u8,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    reactions: Vec<DiscordReaction>,
}

#[derive(Debug, Deserialize)]
struct DiscordReaction {
    count: u32,
    emoji: DiscordEmoji,
}

#[derive(Debug, Deserialize)]
struct DiscordEmoji {
    id: Option<String>,
    name: Option<String>,
}

impl DiscordEmoji {
    /// Unicode emoji are addressed by themselves, custom ones as `name:id`.
    fn key(&self) -> String {
        let name = self.name.clone().unwrap_or_default();
        match &self.id {
            Some(id) => format!("{}:{}", name, id),
            None => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

#[derive(Clone)]
struct DiscordApi {
    client: reqwest::Client,
    token: Arc<str>,
    base: Url,
}

impl DiscordApi {
    fn url(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Other(format!("{} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request, waiting out rate limits. Any other failure is returned
    /// as is.
    async fn call<F>(&self, endpoint: &str, build: F) -> Result<reqwest::Response, TransportError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        loop {
            let resp = build()
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .header(USER_AGENT, "DiscordBot (reddyt, 0.1)")
                .send()
                .await?;
            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = resp
                    .json::<RateLimited>()
                    .await
                    .map(|r| r.retry_after)
                    .unwrap_or(1.0);
                warn!("Rate limited on {}, retrying in {:.2}s", endpoint, wait);
                sleep(Duration::from_secs_f64(wait.max(0.0))).await;
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(TransportError::Status {
                    endpoint: endpoint.to_string(),
                    status: status.as_u16(),
                    body,
                });
            }
            return Ok(resp);
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<T, TransportError> {
        let url = self.url(segments)?;
        let endpoint = url.path().to_string();
        let resp = self.call(&endpoint, || self.client.get(url.clone())).await?;
        Ok(resp.json().await?)
    }

    async fn message(&self, channel: &str, message: &str) -> Result<DiscordMessage, TransportError> {
        self.get(&["channels", channel, "messages", message]).await
    }

    async fn reactors(
        &self,
        channel: &str,
        message: &str,
        emoji: &str,
    ) -> Result<Vec<DiscordUser>, TransportError> {
        let mut url = self.url(&["channels", channel, "messages", message, "reactions", emoji])?;
        url.query_pairs_mut().append_pair("limit", "100");
        let endpoint = url.path().to_string();
        let resp = self.call(&endpoint, || self.client.get(url.clone())).await?;
        Ok(resp.json().await?)
    }
}

/// Connects to Discord with a bot token.
pub struct DiscordBackend {
    api: DiscordApi,
    poll_interval: Duration,
}

impl DiscordBackend {
    pub fn new(token: &str, poll_interval: Duration) -> Result<Self, TransportError> {
        Self::with_api_base(token, poll_interval, API_BASE)
    }

    pub fn with_api_base(
        token: &str,
        poll_interval: Duration,
        base: &str,
    ) -> Result<Self, TransportError> {
        let base = Url::parse(base)
            .map_err(|e| TransportError::Other(format!("bad api base {}: {}", base, e)))?;
        Ok(Self {
            api: DiscordApi {
                client: reqwest::Client::new(),
                token: Arc::from(token),
                base,
            },
            poll_interval,
        })
    }
}

#[async_trait]
impl ChatBackend for DiscordBackend {
    type Connection = DiscordConnection;

    async fn connect(&self, channel: &ChannelId) -> Result<DiscordConnection, TransportError> {
        let me: DiscordUser = self.api.get(&["users", "@me"]).await?;
        let found: DiscordChannel = match self.api.get(&["channels", &channel.0]).await {
            Err(TransportError::Status { status: 404, .. }) => {
                return Err(TransportError::ChannelNotFound(channel.0.clone()));
            }
            other => other?,
        };
        if !TEXT_CHANNEL_KINDS.contains(&found.kind) {
            return Err(TransportError::ChannelNotFound(channel.0.clone()));
        }
        info!(
            "Connected to Discord as {} in #{}",
            me.username,
            found.name.as_deref().unwrap_or(&channel.0)
        );
        Ok(DiscordConnection {
            api: self.api.clone(),
            channel: channel.clone(),
            bot: UserId(me.id),
            poll_interval: self.poll_interval,
            pollers: Vec::new(),
        })
    }
}

pub struct DiscordConnection {
    api: DiscordApi,
    channel: ChannelId,
    bot: UserId,
    poll_interval: Duration,
    pollers: Vec<JoinHandle<()>>,
}

impl DiscordConnection {
    fn stop_pollers(&mut self) {
        for poller in self.pollers.drain(..) {
            poller.abort();
        }
    }
}

impl Drop for DiscordConnection {
    fn drop(&mut self) {
        self.stop_pollers();
    }
}

#[async_trait]
impl ChatConnection for DiscordConnection {
    fn bot_user(&self) -> &UserId {
        &self.bot
    }

    async fn send_text(&mut self, text: &str) -> Result<MessageId, TransportError> {
        let url = self.api.url(&["channels", &self.channel.0, "messages"])?;
        let endpoint = url.path().to_string();
        let body = json!({ "content": text });
        let resp = self
            .api
            .call(&endpoint, || self.api.client.post(url.clone()).json(&body))
            .await?;
        let message: DiscordMessage = resp.json().await?;
        debug!("Sent message {}", message.id);
        Ok(MessageId(message.id))
    }

    async fn send_file(&mut self, path: &Path) -> Result<MessageId, TransportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| TransportError::Attachment {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let url = self.api.url(&["channels", &self.channel.0, "messages"])?;
        let endpoint = url.path().to_string();
        let resp = self
            .api
            .call(&endpoint, || {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                self.api
                    .client
                    .post(url.clone())
                    .multipart(Form::new().part("files[0]", part))
            })
            .await?;
        let message: DiscordMessage = resp.json().await?;
        debug!("Sent file {} as message {}", file_name, message.id);
        Ok(MessageId(message.id))
    }

    async fn add_reaction(
        &mut self,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), TransportError> {
        let url = self.api.url(&[
            "channels",
            &self.channel.0,
            "messages",
            &message.0,
            "reactions",
            emoji,
            "@me",
        ])?;
        let endpoint = url.path().to_string();
        self.api
            .call(&endpoint, || {
                self.api.client.put(url.clone()).header(CONTENT_LENGTH, 0)
            })
            .await?;
        Ok(())
    }

    async fn fetch_reactions(
        &mut self,
        message: &MessageId,
    ) -> Result<Vec<ReactionCount>, TransportError> {
        let fresh = self.api.message(&self.channel.0, &message.0).await?;
        Ok(fresh
            .reactions
            .into_iter()
            .map(|r| ReactionCount {
                emoji: r.emoji.key(),
                count: r.count,
            })
            .collect())
    }

    async fn subscribe_reactions(
        &mut self,
        message: &MessageId,
    ) -> Result<ReactionFeed, TransportError> {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let poller = ReactionPoller {
            api: self.api.clone(),
            channel: self.channel.0.clone(),
            message: message.0.clone(),
            interval: self.poll_interval,
            counts: HashMap::new(),
            reactors: HashMap::new(),
        };
        self.pollers.push(tokio::spawn(poller.run(tx)));
        Ok(rx)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stop_pollers();
        debug!("Closed Discord connection for channel {}", self.channel.0);
        Ok(())
    }
}

struct ReactionPoller {
    api: DiscordApi,
    channel: String,
    message: String,
    interval: Duration,
    counts: HashMap<String, u32>,
    reactors: HashMap<String, HashSet<String>>,
}

impl ReactionPoller {
    async fn run(mut self, tx: mpsc::Sender<Result<ReactionEvent, TransportError>>) {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = sleep(self.interval) => {}
            }
            match self.poll().await {
                Ok(events) => {
                    for event in events {
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
        debug!("Reaction poller for message {} stopped", self.message);
    }

    async fn poll(&mut self) -> Result<Vec<ReactionEvent>, TransportError> {
        let message = self.api.message(&self.channel, &self.message).await?;
        let mut events = Vec::new();
        for reaction in message.reactions {
            let emoji = reaction.emoji.key();
            // A remove followed by an add leaves the count unchanged, so
            // control glyphs get their reactor list read on every poll.
            let unchanged = self.counts.get(&emoji) == Some(&reaction.count);
            if unchanged && !is_control(&emoji) {
                continue;
            }
            let users = self
                .api
                .reactors(&self.channel, &self.message, &emoji)
                .await?;
            let current: HashSet<String> = users.into_iter().map(|u| u.id).collect();
            let previous = self.reactors.entry(emoji.clone()).or_default();
            for user in new_reactors(previous, &current) {
                events.push(ReactionEvent {
                    emoji: emoji.clone(),
                    user,
                });
            }
            *previous = current;
            self.counts.insert(emoji, reaction.count);
        }
        Ok(events)
    }
}

fn is_control(emoji: &str) -> bool {
    Glyph::controls().iter().any(|g| g.emoji() == emoji)
}

/// Users present now who were not present on the previous poll, sorted for a
/// stable delivery order.
fn new_reactors(previous: &HashSet<String>, current: &HashSet<String>) -> Vec<UserId> {
    let mut added: Vec<&String> = current.difference(previous).collect();
    added.sort();
    added.into_iter().map(|id| UserId(id.clone())).collect()
}
