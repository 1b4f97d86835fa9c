//! Reddit threads to short videos, with comment selection done by reacting to
//! a ballot message in Discord.

pub mod args;
pub mod audio;
pub mod ballot;
pub mod capture;
pub mod chat;
pub mod discord;
pub mod engine;
pub mod error;
pub mod glyph;
pub mod ml_log;
pub mod notify;
pub mod paginate;
pub mod reddit;
pub mod session;
pub mod tts;
pub mod video;

pub use ballot::{Ballot, Comment, MAX_COMMENTS, Post, SessionOutcome, ValidationError};
pub use chat::{ChannelId, ChatBackend, ChatConnection, TransportError};
pub use error::CurationError;
pub use session::{CurationHandle, CurationSession, SessionConfig};
