use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::glyph::GLYPH_SPACE;

/// Most comments a single ballot may carry. Bounded by the number of
/// reactions the chat platform lets one message hold once the three control
/// glyphs are attached.
pub const MAX_COMMENTS: usize = 17;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub text: String,
    pub id: String,
    pub image_ref: Option<PathBuf>,
    pub nsfw: bool,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub post_id: String,
    pub comment_id: String,
    pub image_ref: Option<PathBuf>,
}

/// A post plus the ordered candidate comments awaiting curation.
///
/// The index of a comment in `comments` is its selector glyph for the whole
/// curation session. The list is only replaced once, when the session
/// finalizes, through [`Ballot::retain_chosen`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub subreddit: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ballot has {count} comments, at most {cap} are allowed")]
    TooManyComments { count: usize, cap: usize },

    #[error("comment cap {0} exceeds the selector glyph space")]
    CapExceedsGlyphSpace(usize),

    #[error("post {0} has no captured image")]
    MissingPostImage(String),

    #[error("comment {0} has no captured image")]
    MissingCommentImage(String),
}

impl Ballot {
    pub fn new(post: Post, comments: Vec<Comment>, subreddit: impl Into<String>) -> Self {
        Self {
            post,
            comments,
            subreddit: subreddit.into(),
        }
    }

    /// Checks the preconditions a ballot must meet before curation starts.
    pub fn validate(&self, cap: usize) -> Result<(), ValidationError> {
        if cap > GLYPH_SPACE {
            return Err(ValidationError::CapExceedsGlyphSpace(cap));
        }
        if self.comments.len() > cap {
            return Err(ValidationError::TooManyComments {
                count: self.comments.len(),
                cap,
            });
        }
        if self.post.image_ref.is_none() {
            return Err(ValidationError::MissingPostImage(self.post.id.clone()));
        }
        if let Some(c) = self.comments.iter().find(|c| c.image_ref.is_none()) {
            return Err(ValidationError::MissingCommentImage(c.comment_id.clone()));
        }
        Ok(())
    }

    /// Replaces the comment list with the comments whose index is in
    /// `chosen`, keeping ballot order whatever order `chosen` is in.
    pub fn retain_chosen(&mut self, chosen: &[usize]) {
        let kept = self
            .comments
            .iter()
            .enumerate()
            .filter(|(i, _)| chosen.contains(i))
            .map(|(_, c)| c.clone())
            .collect();
        self.comments = kept;
    }
}

/// Terminal result of one curation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Finalized(Ballot),
    Declined,
    TimedOut,
}

impl SessionOutcome {
    pub fn into_ballot(self) -> Option<Ballot> {
        match self {
            SessionOutcome::Finalized(ballot) => Some(ballot),
            SessionOutcome::Declined | SessionOutcome::TimedOut => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Finalized(_) => "finalized",
            SessionOutcome::Declined => "declined",
            SessionOutcome::TimedOut => "timed out",
        }
    }
}
