use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use reddyt::args::Args;
use reddyt::capture::Capturer;
use reddyt::chat::ChannelId;
use reddyt::discord::DiscordBackend;
use reddyt::ml_log::{CsvCurationLog, CurationLog};
use reddyt::notify::{notify, notify_with_file};
use reddyt::reddit::{UsedPosts, fetch_top_comments, fetch_top_posts};
use reddyt::session::{CurationSession, SessionConfig};
use reddyt::video::{VideoOptions, make_video};
use reddyt::SessionOutcome;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting reddit curation video pipeline");

    let args = Args::parse();
    let backend = Arc::new(DiscordBackend::new(&args.discord_token, args.poll_interval())?);
    let channel = ChannelId(args.channel_id.clone());

    if let Err(e) = run(&args, Arc::clone(&backend), &channel).await {
        error!("Pipeline failed: {:?}", e);
        let message = format!("Pipeline failed: {:#}", e);
        if let Err(notify_err) = notify(backend.as_ref(), &channel, &message).await {
            error!("Could not notify operator channel: {}", notify_err);
        }
        return Err(e);
    }

    info!("Process complete.");
    Ok(())
}

async fn run(args: &Args, backend: Arc<DiscordBackend>, channel: &ChannelId) -> anyhow::Result<()> {
    if !args.background.exists() {
        anyhow::bail!("Background video not found: {}", args.background.display());
    }
    info!("Background video found: {}", args.background.display());

    let mut used = UsedPosts::load(&args.used_posts)?;
    info!(
        "Fetching top {} posts from r/{} ({})",
        args.posts, args.subreddit, args.time_filter
    );
    let posts = fetch_top_posts(&args.subreddit, &args.time_filter, args.posts, &used).await?;
    if posts.is_empty() {
        anyhow::bail!("No suitable posts found in subreddit {}", args.subreddit);
    }

    let capturer = Capturer::new(&args.browser, &args.images_dir);
    let log: Arc<dyn CurationLog> = Arc::new(CsvCurationLog::new(&args.posts_csv, &args.comments_csv));
    let session = CurationSession::new(
        Arc::clone(&backend),
        log,
        SessionConfig::new(channel.clone()).with_timeout(args.curation_timeout()),
    );
    let video_opts = VideoOptions {
        background: args.background.clone(),
        music: args.music.clone(),
        piper_model: args.piper_model.clone(),
        out_dir: args.out_dir.clone(),
    };

    let total = posts.len();
    let mut videos = Vec::new();
    for (i, post) in posts.into_iter().enumerate() {
        info!("Post {}/{}: {}", i + 1, total, post.text);
        let comments = fetch_top_comments(&post.id, args.comments as usize).await?;
        if comments.is_empty() {
            warn!("Post {} has no usable comments. Skipping...", post.id);
            continue;
        }

        let post_id = post.id.clone();
        let Some(ballot) = capturer.build_ballot(post, comments, &args.subreddit)? else {
            continue;
        };

        let handle = session.curate(ballot, |outcome| {
            info!("Curation finished: {}", outcome.label());
        })?;
        match handle.wait().await? {
            SessionOutcome::Finalized(ballot) => {
                used.mark(&post_id)?;
                info!(
                    "Comments chosen for post {}: {}, creating video",
                    post_id,
                    ballot.comments.len()
                );
                let path = make_video(&ballot, &video_opts)?;
                let message = format!("Video ready: {}", path.display());
                if let Err(e) = notify_with_file(backend.as_ref(), channel, &message, &path).await {
                    warn!("Could not upload video {}: {}", path.display(), e);
                    notify(backend.as_ref(), channel, &message).await?;
                }
                videos.push(path);
            }
            SessionOutcome::Declined => {
                used.mark(&post_id)?;
            }
            SessionOutcome::TimedOut => {
                warn!("No decision on post {}; it stays eligible for a later run", post_id);
            }
        }
    }

    info!("Made {} videos from {} posts", videos.len(), total);
    Ok(())
}
