use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::ballot::MAX_COMMENTS;
use crate::reddit::TIME_FILTERS;

#[derive(Parser, Debug)]
#[command(
    name = "reddyt",
    about = "Turn top reddit threads into short videos, curated by reaction in Discord"
)]
pub struct Args {
    #[clap(long, default_value = "AskReddit")]
    pub subreddit: String,

    /// Top posts window: all, day, hour, month, week or year
    #[clap(long, default_value = "day", value_parser = clap::builder::PossibleValuesParser::new(TIME_FILTERS))]
    pub time_filter: String,

    #[clap(long, default_value_t = 5)]
    pub posts: usize,

    /// Candidate comments per post, at most 17
    #[clap(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=MAX_COMMENTS as i64))]
    pub comments: u8,

    #[clap(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    #[clap(long, env = "DISCORD_CHANNEL_ID")]
    pub channel_id: String,

    /// Give up on a ballot after this many seconds without a reaction
    #[clap(long)]
    pub curation_timeout: Option<u64>,

    #[clap(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[clap(long, default_value = "chromium")]
    pub browser: String,

    #[clap(long, default_value = "./images")]
    pub images_dir: PathBuf,

    #[clap(long, default_value = "./res/bg.mp4")]
    pub background: PathBuf,

    #[clap(long)]
    pub music: Option<PathBuf>,

    #[clap(long, default_value = "./videos")]
    pub out_dir: PathBuf,

    #[clap(long, default_value = "./tts/en_US-hfc_male-medium.onnx")]
    pub piper_model: String,

    #[clap(long, default_value = "./ML/posts.csv")]
    pub posts_csv: PathBuf,

    #[clap(long, default_value = "./ML/comments.csv")]
    pub comments_csv: PathBuf,

    #[clap(long, default_value = "./config/used_posts.json")]
    pub used_posts: PathBuf,
}

impl Args {
    pub fn curation_timeout(&self) -> Option<Duration> {
        self.curation_timeout.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(250))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec![
            "reddyt",
            "--discord-token",
            "t",
            "--channel-id",
            "1092145376846434405",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn defaults_wait_forever() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.subreddit, "AskReddit");
        assert_eq!(args.time_filter, "day");
        assert_eq!(args.comments, 10);
        assert!(args.curation_timeout().is_none());
    }

    #[test]
    fn rejects_unknown_time_filter() {
        assert!(parse(&["--time-filter", "decade"]).is_err());
    }

    #[test]
    fn rejects_more_comments_than_glyph_slots() {
        assert!(parse(&["--comments", "18"]).is_err());
        assert_eq!(parse(&["--comments", "17"]).unwrap().comments, 17);
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let args = parse(&["--poll-interval-ms", "10", "--curation-timeout", "60"]).unwrap();
        assert_eq!(args.poll_interval(), Duration::from_millis(250));
        assert_eq!(args.curation_timeout(), Some(Duration::from_secs(60)));
    }
}
