//! Curation session: one engine run for one ballot, from connecting to the
//! chat backend to tearing the connection down.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::ballot::{Ballot, MAX_COMMENTS, SessionOutcome, ValidationError};
use crate::chat::{ChannelId, ChatBackend, ChatConnection};
use crate::engine::ReactionEngine;
use crate::error::CurationError;
use crate::ml_log::CurationLog;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub channel: ChannelId,
    pub comment_cap: usize,
    /// Inactivity window; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            comment_cap: MAX_COMMENTS,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_comment_cap(mut self, cap: usize) -> Self {
        self.comment_cap = cap;
        self
    }
}

/// Write-once holder for a session's outcome.
#[derive(Debug, Clone, Default)]
pub struct OutcomeSlot(Arc<OnceLock<SessionOutcome>>);

impl OutcomeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the outcome. A second fill is refused and hands the value back.
    pub fn fill(&self, outcome: SessionOutcome) -> Result<(), SessionOutcome> {
        self.0.set(outcome)
    }

    pub fn get(&self) -> Option<&SessionOutcome> {
        self.0.get()
    }
}

/// Handle to a running session.
pub struct CurationHandle {
    task: JoinHandle<Result<SessionOutcome, CurationError>>,
    slot: OutcomeSlot,
}

impl CurationHandle {
    /// The outcome, once the session has reached a terminal state.
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.slot.get()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<SessionOutcome, CurationError> {
        self.task
            .await
            .map_err(|e| CurationError::Aborted(e.to_string()))?
    }
}

/// Runs curation sessions one after another against a chat backend.
///
/// Sessions are not reentrant against one channel: wait for a handle before
/// starting the next ballot.
pub struct CurationSession<B: ChatBackend> {
    backend: Arc<B>,
    log: Arc<dyn CurationLog>,
    config: SessionConfig,
}

impl<B> CurationSession<B>
where
    B: ChatBackend + 'static,
    B::Connection: 'static,
{
    pub fn new(backend: Arc<B>, log: Arc<dyn CurationLog>, config: SessionConfig) -> Self {
        Self {
            backend,
            log,
            config,
        }
    }

    /// Validates `ballot` and starts curating it. `on_complete` runs once with
    /// the terminal outcome; it does not run when the session aborts on error.
    pub fn curate<F>(&self, ballot: Ballot, on_complete: F) -> Result<CurationHandle, ValidationError>
    where
        F: FnOnce(&SessionOutcome) + Send + 'static,
    {
        ballot.validate(self.config.comment_cap)?;
        let slot = OutcomeSlot::new();
        let task = tokio::spawn(run_session(
            Arc::clone(&self.backend),
            Arc::clone(&self.log),
            self.config.clone(),
            ballot,
            slot.clone(),
            on_complete,
        ));
        Ok(CurationHandle { task, slot })
    }
}

async fn run_session<B, F>(
    backend: Arc<B>,
    log: Arc<dyn CurationLog>,
    config: SessionConfig,
    ballot: Ballot,
    slot: OutcomeSlot,
    on_complete: F,
) -> Result<SessionOutcome, CurationError>
where
    B: ChatBackend,
    F: FnOnce(&SessionOutcome) + Send,
{
    let post_id = ballot.post.id.clone();
    info!(
        "Curating post {} with {} comments in channel {}",
        post_id,
        ballot.comments.len(),
        config.channel.0
    );
    let mut conn = backend.connect(&config.channel).await?;

    let result = ReactionEngine::new(&mut conn, log.as_ref(), config.timeout)
        .run(ballot)
        .await;
    if let Err(e) = conn.close().await {
        warn!("Failed to close chat connection: {}", e);
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Curation of post {} aborted: {}", post_id, e);
            return Err(e);
        }
    };
    info!("Curation of post {} {}", post_id, outcome.label());
    if slot.fill(outcome.clone()).is_err() {
        error!("Outcome for post {} was already recorded", post_id);
    }
    on_complete(&outcome);
    Ok(outcome)
}
