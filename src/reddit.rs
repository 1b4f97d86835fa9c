use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use reqwest::header::USER_AGENT;
use tracing::{debug, info};

use crate::ballot::{Comment, Post};

const BOT_USER_AGENT: &str = "reddyt-curation-bot/0.1";

pub const TIME_FILTERS: [&str; 6] = ["all", "day", "hour", "month", "week", "year"];

#[derive(Debug, Deserialize)]
pub struct RedditListing<T> {
    pub data: RedditListingData<T>,
}

#[derive(Debug, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditChild<T>>,
}

#[derive(Debug, Deserialize)]
pub struct RedditChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    pub over_18: Option<bool>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub stickied: bool,
}

#[derive(Debug, Deserialize)]
pub struct RedditComment {
    pub id: String,
    pub body: Option<String>,
    pub link_id: Option<String>,
    #[serde(default)]
    pub stickied: bool,
}

pub async fn fetch_top_posts(
    subreddit: &str,
    time_filter: &str,
    n: usize,
    used: &UsedPosts,
) -> anyhow::Result<Vec<Post>> {
    if !TIME_FILTERS.contains(&time_filter) {
        anyhow::bail!("Invalid time filter {}", time_filter);
    }
    // over-fetch so skipped posts still leave n candidates
    let url = format!(
        "https://www.reddit.com/r/{}/top.json?t={}&limit={}",
        subreddit,
        time_filter,
        (n * 3).clamp(1, 100)
    );
    let res = get_text(&url).await?;
    let parsed: RedditListing<RedditPost> = serde_json::from_str(&res)?;
    let posts = posts_from_listing(parsed, n, used);
    info!("Found {} posts in r/{}", posts.len(), subreddit);
    Ok(posts)
}

pub async fn fetch_top_comments(post_id: &str, m: usize) -> anyhow::Result<Vec<Comment>> {
    let url = format!(
        "https://www.reddit.com/comments/{}.json?sort=top&depth=1&limit={}",
        post_id,
        m + 5
    );
    let res = get_text(&url).await?;
    let (_post, comments): (serde_json::Value, RedditListing<RedditComment>) =
        serde_json::from_str(&res)?;
    let comments = comments_from_listing(comments, post_id, m);
    info!("Found {} comments on post {}", comments.len(), post_id);
    Ok(comments)
}

async fn get_text(url: &str) -> anyhow::Result<String> {
    debug!("GET {}", url);
    let client = reqwest::Client::new();
    let res = client
        .get(url)
        .header(USER_AGENT, BOT_USER_AGENT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(res)
}

/// Keeps the first `n` posts that are neither NSFW, stickied, nor already used.
pub fn posts_from_listing(
    listing: RedditListing<RedditPost>,
    n: usize,
    used: &UsedPosts,
) -> Vec<Post> {
    listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| {
            let nsfw = post.over_18.unwrap_or(false);
            if nsfw || post.stickied || used.contains(&post.id) {
                debug!("Skipping post (NSFW, stickied or already used): {}", post.title);
                return false;
            }
            !post.title.trim().is_empty()
        })
        .take(n)
        .map(|post| Post {
            text: post.title.trim().to_string(),
            id: post.id,
            image_ref: None,
            nsfw: false,
            score: post.score,
        })
        .collect()
}

/// Keeps the first `m` real top-level comments, dropping "load more" stubs,
/// stickied comments and deleted or removed ones.
pub fn comments_from_listing(
    listing: RedditListing<RedditComment>,
    post_id: &str,
    m: usize,
) -> Vec<Comment> {
    listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t1")
        .map(|child| child.data)
        .filter(|c| !c.stickied)
        .filter_map(|c| {
            let body = c.body?.trim().to_string();
            if body.is_empty() || body == "[deleted]" || body == "[removed]" {
                return None;
            }
            let post_id = c
                .link_id
                .as_deref()
                .map(|l| l.trim_start_matches("t3_").to_string())
                .unwrap_or_else(|| post_id.to_string());
            Some(Comment {
                text: body,
                post_id,
                comment_id: c.id,
                image_ref: None,
            })
        })
        .take(m)
        .collect()
}

/// Ids of posts that already went through curation, persisted as JSON.
#[derive(Debug, Default)]
pub struct UsedPosts {
    path: PathBuf,
    ids: HashSet<String>,
}

impl UsedPosts {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let ids = load_used_ids(&path)?;
        Ok(Self { path, ids })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn mark(&mut self, id: &str) -> anyhow::Result<()> {
        if self.ids.insert(id.to_string()) {
            save_used_ids(&self.path, &self.ids)?;
        }
        Ok(())
    }
}

fn load_used_ids(path: &Path) -> anyhow::Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let data = fs::read_to_string(path)?;
    let ids: Vec<String> = serde_json::from_str(&data)?;
    Ok(ids.into_iter().collect())
}

fn save_used_ids(path: &Path, ids: &HashSet<String>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    let data = serde_json::to_string_pretty(&sorted)?;
    fs::write(path, data)?;
    Ok(())
}
