use thiserror::Error;

use crate::ballot::ValidationError;
use crate::chat::TransportError;
use crate::ml_log::LogError;

/// Errors that abort a curation session.
#[derive(Debug, Error)]
pub enum CurationError {
    #[error("invalid ballot: {0}")]
    Validation(#[from] ValidationError),

    #[error("chat transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("could not record curation result: {0}")]
    Log(#[from] LogError),

    #[error("curation task stopped before finishing: {0}")]
    Aborted(String),
}

impl CurationError {
    pub fn is_transport(&self) -> bool {
        matches!(self, CurationError::Transport(_))
    }
}
