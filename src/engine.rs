//! Reaction protocol engine.
//!
//! Posts a ballot to the channel, attaches one selector glyph per comment and
//! the three control glyphs, then waits for reactions:
//!
//! ```text
//! RENDERING -> AWAITING_REACTION -> RECONCILING -> FINALIZED
//!                    |  |  |
//!                    |  |  +-- ACCEPT_ALL ------> FINALIZED
//!                    |  +----- CANCEL ----------> DECLINED
//!                    +-------- timeout ---------> TIMED_OUT
//! ```
//!
//! Selection is read from live reaction counts at confirm time: a comment is
//! chosen when its selector has more reactors than the bot's own seed reaction.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::ballot::{Ballot, SessionOutcome};
use crate::chat::{ChatConnection, MessageId, ReactionEvent, ReactionFeed, TransportError};
use crate::error::CurationError;
use crate::glyph::{ACCEPT_ALL, CANCEL, CONFIRM, Glyph, selector_label};
use crate::ml_log::{CurationLog, LogRecord};
use crate::paginate::{MAX_MESSAGE_LEN, paginate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Rendering,
    AwaitingReaction,
    Reconciling,
    Finalized,
    Declined,
    TimedOut,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Finalized | EngineState::Declined | EngineState::TimedOut
        )
    }
}

pub struct ReactionEngine<'a, C: ChatConnection> {
    conn: &'a mut C,
    log: &'a dyn CurationLog,
    timeout: Option<Duration>,
    state: EngineState,
}

impl<'a, C: ChatConnection> ReactionEngine<'a, C> {
    pub fn new(conn: &'a mut C, log: &'a dyn CurationLog, timeout: Option<Duration>) -> Self {
        Self {
            conn,
            log,
            timeout,
            state: EngineState::Rendering,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        debug!("Curation state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs one ballot to a terminal outcome.
    pub async fn run(&mut self, ballot: Ballot) -> Result<SessionOutcome, CurationError> {
        self.transition(EngineState::Rendering);
        let n = ballot.comments.len();
        let message = self.render(&ballot).await?;

        let mut feed = self.conn.subscribe_reactions(&message).await?;
        self.transition(EngineState::AwaitingReaction);
        info!("Waiting for reactions on ballot for post {}", ballot.post.id);

        let result = self.await_outcome(&mut feed, ballot, &message, n).await;
        feed.close();
        result
    }

    async fn await_outcome(
        &mut self,
        feed: &mut ReactionFeed,
        ballot: Ballot,
        message: &MessageId,
        n: usize,
    ) -> Result<SessionOutcome, CurationError> {
        let mut deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            let Some(event) = next_event(feed, deadline).await? else {
                return self.time_out().await;
            };
            let Some(glyph) = self.qualify(&event, n) else {
                debug!("Ignoring reaction {} from {}", event.emoji, event.user.0);
                continue;
            };
            deadline = self.timeout.map(|t| Instant::now() + t);
            match glyph {
                Glyph::Selector(i) => {
                    debug!("{} voted for comment {}", event.user.0, selector_label(i));
                }
                Glyph::AcceptAll => return self.accept_all(ballot).await,
                Glyph::Confirm => return self.reconcile(ballot, message).await,
                Glyph::Cancel => return self.decline(&ballot).await,
            }
        }
    }

    /// A reaction qualifies when it comes from someone other than the bot and
    /// is one of the ballot's glyphs.
    fn qualify(&self, event: &ReactionEvent, n: usize) -> Option<Glyph> {
        if &event.user == self.conn.bot_user() {
            return None;
        }
        Glyph::parse(&event.emoji, n)
    }

    async fn render(&mut self, ballot: &Ballot) -> Result<MessageId, CurationError> {
        let n = ballot.comments.len();
        self.conn
            .send_text(&format!(
                "##############################\nStarting {} video!\n\n{}, score: {}",
                ballot.subreddit, ballot.post.text, ballot.post.score
            ))
            .await?;
        if let Some(image) = &ballot.post.image_ref {
            self.conn.send_file(image).await?;
        }

        let entries: Vec<(String, &str)> = ballot
            .comments
            .iter()
            .enumerate()
            .map(|(i, c)| (selector_label(i), c.text.as_str()))
            .collect();
        let chunks = paginate(&entries, MAX_MESSAGE_LEN);
        debug!("Ballot text split into {} messages", chunks.len());
        for chunk in &chunks {
            self.conn.send_text(chunk).await?;
        }

        let instructions = format!(
            "React with the letters of your chosen answers and {} to confirm or {} to cancel.\n\
             You can also react with {} to select all the comments.",
            CONFIRM, CANCEL, ACCEPT_ALL
        );
        let message = self.conn.send_text(&instructions).await?;
        for glyph in Glyph::ballot_set(n) {
            self.conn.add_reaction(&message, &glyph.emoji()).await?;
        }
        Ok(message)
    }

    async fn accept_all(&mut self, ballot: Ballot) -> Result<SessionOutcome, CurationError> {
        self.announce("Okayed all comments").await?;

        let mut records = vec![LogRecord::post(&ballot.post, true)];
        records.extend(ballot.comments.iter().map(|c| LogRecord::comment(c, true)));
        self.log.append(&records)?;
        self.transition(EngineState::Finalized);
        Ok(SessionOutcome::Finalized(ballot))
    }

    async fn reconcile(
        &mut self,
        mut ballot: Ballot,
        message: &MessageId,
    ) -> Result<SessionOutcome, CurationError> {
        self.transition(EngineState::Reconciling);
        let n = ballot.comments.len();
        let live = self.conn.fetch_reactions(message).await?;
        let chosen: BTreeSet<usize> = live
            .iter()
            .filter(|r| r.count > 1)
            .filter_map(|r| match Glyph::parse(&r.emoji, n) {
                Some(Glyph::Selector(i)) => Some(i),
                _ => None,
            })
            .collect();
        let chosen: Vec<usize> = chosen.into_iter().collect();

        let picked = if chosen.is_empty() {
            warn!("Confirmed ballot for post {} with no comments picked", ballot.post.id);
            "Picked no comments".to_string()
        } else {
            let glyphs: Vec<String> = chosen.iter().map(|i| Glyph::Selector(*i).emoji()).collect();
            format!("Picked comments {}", glyphs.join(", "))
        };
        self.announce(&picked).await?;

        let mut records = vec![LogRecord::post(&ballot.post, true)];
        records.extend(
            ballot
                .comments
                .iter()
                .enumerate()
                .map(|(i, c)| LogRecord::comment(c, chosen.contains(&i))),
        );
        self.log.append(&records)?;
        ballot.retain_chosen(&chosen);
        self.transition(EngineState::Finalized);
        Ok(SessionOutcome::Finalized(ballot))
    }

    async fn decline(&mut self, ballot: &Ballot) -> Result<SessionOutcome, CurationError> {
        self.announce("Declined post.").await?;
        self.log.append(&[LogRecord::post(&ballot.post, false)])?;
        self.transition(EngineState::Declined);
        Ok(SessionOutcome::Declined)
    }

    /// A failed announcement does not turn a timeout into an error.
    async fn time_out(&mut self) -> Result<SessionOutcome, CurationError> {
        if let Err(e) = self.announce("Curation timed out.").await {
            warn!("Could not announce curation timeout: {}", e);
        }
        self.transition(EngineState::TimedOut);
        Ok(SessionOutcome::TimedOut)
    }

    async fn announce(&mut self, text: &str) -> Result<(), TransportError> {
        info!("{}", text);
        self.conn.send_text(text).await.map(|_| ())
    }
}

/// Waits for the next reaction. `Ok(None)` means the deadline passed.
async fn next_event(
    feed: &mut ReactionFeed,
    deadline: Option<Instant>,
) -> Result<Option<ReactionEvent>, TransportError> {
    let received = match deadline {
        Some(deadline) => match timeout_at(deadline, feed.recv()).await {
            Ok(received) => received,
            Err(_) => return Ok(None),
        },
        None => feed.recv().await,
    };
    match received {
        Some(Ok(event)) => Ok(Some(event)),
        Some(Err(e)) => Err(e),
        None => Err(TransportError::FeedClosed),
    }
}
