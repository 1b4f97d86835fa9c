use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::ballot::{Comment, Post};

/// One row of curation training data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Post {
        post_id: String,
        text: String,
        accepted: bool,
    },
    Comment {
        post_id: String,
        comment_id: String,
        text: String,
        accepted: bool,
    },
}

impl LogRecord {
    pub fn post(post: &Post, accepted: bool) -> Self {
        LogRecord::Post {
            post_id: post.id.clone(),
            text: post.text.clone(),
            accepted,
        }
    }

    pub fn comment(comment: &Comment, accepted: bool) -> Self {
        LogRecord::Comment {
            post_id: comment.post_id.clone(),
            comment_id: comment.comment_id.clone(),
            text: comment.text.clone(),
            accepted,
        }
    }

    pub fn accepted(&self) -> bool {
        match self {
            LogRecord::Post { accepted, .. } | LogRecord::Comment { accepted, .. } => *accepted,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Durable, append-only sink for curation decisions.
pub trait CurationLog: Send + Sync {
    fn append(&self, records: &[LogRecord]) -> Result<(), LogError>;
}

/// Appends posts and comments to two CSV files.
#[derive(Debug, Clone)]
pub struct CsvCurationLog {
    posts_path: PathBuf,
    comments_path: PathBuf,
}

impl CsvCurationLog {
    pub fn new(posts_path: impl Into<PathBuf>, comments_path: impl Into<PathBuf>) -> Self {
        Self {
            posts_path: posts_path.into(),
            comments_path: comments_path.into(),
        }
    }

    fn writer(path: &Path) -> Result<csv::Writer<fs::File>, LogError> {
        let io_err = |source| LogError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        Ok(csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file))
    }
}

impl CurationLog for CsvCurationLog {
    fn append(&self, records: &[LogRecord]) -> Result<(), LogError> {
        let mut posts = None;
        let mut comments = None;
        for record in records {
            match record {
                LogRecord::Post {
                    post_id,
                    text,
                    accepted,
                } => {
                    if posts.is_none() {
                        posts = Some(Self::writer(&self.posts_path)?);
                    }
                    if let Some(w) = posts.as_mut() {
                        let text = ascii_only(text);
                        let accepted = accepted.to_string();
                        w.write_record([post_id.as_str(), text.as_str(), accepted.as_str()])?;
                    }
                }
                LogRecord::Comment {
                    post_id,
                    comment_id,
                    text,
                    accepted,
                } => {
                    if comments.is_none() {
                        comments = Some(Self::writer(&self.comments_path)?);
                    }
                    if let Some(w) = comments.as_mut() {
                        let text = ascii_only(text);
                        let accepted = accepted.to_string();
                        w.write_record([
                            post_id.as_str(),
                            comment_id.as_str(),
                            text.as_str(),
                            accepted.as_str(),
                        ])?;
                    }
                }
            }
        }
        for w in posts.iter_mut().chain(comments.iter_mut()) {
            w.flush().map_err(|source| LogError::Io {
                path: "curation log".to_string(),
                source,
            })?;
        }
        debug!("Appended {} curation log records", records.len());
        Ok(())
    }
}

/// Replaces every non-ASCII char with a space.
fn ascii_only(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { ' ' })
        .collect()
}
