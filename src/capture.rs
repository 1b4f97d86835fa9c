use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info, warn};

use crate::ballot::{Ballot, Comment, Post};

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

/// Screenshots reddit pages with a headless Chromium in a phone-sized window.
pub struct Capturer {
    browser: String,
    images_dir: PathBuf,
}

impl Capturer {
    pub fn new(browser: impl Into<String>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            browser: browser.into(),
            images_dir: images_dir.into(),
        }
    }

    pub fn post_image_path(&self, post: &Post) -> PathBuf {
        self.images_dir.join(format!("{}.png", post.id))
    }

    pub fn comment_image_path(&self, comment: &Comment) -> PathBuf {
        self.images_dir
            .join(format!("{}_{}.png", comment.post_id, comment.comment_id))
    }

    /// Captures the post and each comment. Comments that fail are dropped;
    /// a post that fails, or ends with no comments, yields `None`.
    pub fn build_ballot(
        &self,
        mut post: Post,
        comments: Vec<Comment>,
        subreddit: &str,
    ) -> anyhow::Result<Option<Ballot>> {
        fs::create_dir_all(&self.images_dir)?;

        let post_image = self.post_image_path(&post);
        let post_url = format!("https://www.reddit.com/r/{}/comments/{}", subreddit, post.id);
        if let Err(e) = self.screenshot(&post_url, &post_image) {
            warn!("Failed to capture post {}: {:?}", post.id, e);
            return Ok(None);
        }
        post.image_ref = Some(post_image);

        let mut captured = Vec::new();
        for mut comment in comments {
            let image = self.comment_image_path(&comment);
            let url = format!(
                "https://www.reddit.com/r/{}/comments/{}/comment/{}",
                subreddit, comment.post_id, comment.comment_id
            );
            match self.screenshot(&url, &image) {
                Ok(()) => {
                    comment.image_ref = Some(image);
                    captured.push(comment);
                }
                Err(e) => warn!("Failed to capture comment {}: {:?}", comment.comment_id, e),
            }
        }
        if captured.is_empty() {
            warn!("Failed to capture any comments for post {}. Skipping...", post.id);
            return Ok(None);
        }
        info!(
            "Captured post {} with {} comments",
            post.id,
            captured.len()
        );
        Ok(Some(Ballot::new(post, captured, subreddit)))
    }

    fn screenshot(&self, url: &str, out_path: &Path) -> anyhow::Result<()> {
        info!("Capturing {} to {}", url, out_path.display());
        let status = Command::new(&self.browser)
            .args(screenshot_args(url, out_path))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            error!("Browser failed to capture {}", url);
            anyhow::bail!("browser exited with {}", status);
        }
        if !out_path.exists() {
            anyhow::bail!("browser did not write {}", out_path.display());
        }
        Ok(())
    }
}

fn screenshot_args(url: &str, out_path: &Path) -> Vec<String> {
    vec![
        "--headless=new".to_string(),
        "--disable-gpu".to_string(),
        "--hide-scrollbars".to_string(),
        "--window-size=375,667".to_string(),
        "--force-device-scale-factor=3".to_string(),
        format!("--user-agent={}", MOBILE_USER_AGENT),
        format!("--screenshot={}", out_path.display()),
        url.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_paths_follow_ids() {
        let capturer = Capturer::new("chromium", "images");
        let post = Post {
            text: "t".into(),
            id: "abc".into(),
            image_ref: None,
            nsfw: false,
            score: 1,
        };
        let comment = Comment {
            text: "c".into(),
            post_id: "abc".into(),
            comment_id: "xyz".into(),
            image_ref: None,
        };
        assert_eq!(capturer.post_image_path(&post), PathBuf::from("images/abc.png"));
        assert_eq!(
            capturer.comment_image_path(&comment),
            PathBuf::from("images/abc_xyz.png")
        );
    }

    #[test]
    fn screenshot_args_end_with_url() {
        let args = screenshot_args("https://www.reddit.com/r/x", Path::new("out.png"));
        assert_eq!(args.last().map(String::as_str), Some("https://www.reddit.com/r/x"));
        assert!(args.contains(&"--screenshot=out.png".to_string()));
    }

    #[test]
    fn missing_browser_skips_post() {
        let dir = tempfile::tempdir().unwrap();
        let capturer = Capturer::new("definitely-not-a-browser-binary", dir.path());
        let post = Post {
            text: "t".into(),
            id: "abc".into(),
            image_ref: None,
            nsfw: false,
            score: 1,
        };
        let ballot = capturer.build_ballot(post, Vec::new(), "AskReddit").unwrap();
        assert!(ballot.is_none());
    }
}
