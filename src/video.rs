use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};

use crate::audio::wav_duration_seconds;
use crate::ballot::Ballot;
use crate::tts::tts_generate;

/// Silence kept after each narration before the next image.
const SEGMENT_PAUSE: f64 = 0.4;
const MUSIC_VOLUME: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub background: PathBuf,
    pub music: Option<PathBuf>,
    pub piper_model: String,
    pub out_dir: PathBuf,
}

/// One screenshot shown while its text is narrated.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub start: f64,
    pub duration: f64,
}

/// Renders a curated ballot: the post, then every chosen comment, each as its
/// screenshot over the background while the text is read out.
pub fn make_video(ballot: &Ballot, opts: &VideoOptions) -> anyhow::Result<PathBuf> {
    if !opts.background.exists() {
        anyhow::bail!("Background video not found: {}", opts.background.display());
    }
    let work_dir = opts.out_dir.join(format!("{}_tmp", ballot.post.id));
    if work_dir.exists() {
        info!("Removing existing tmp dir '{}'", work_dir.display());
        fs::remove_dir_all(&work_dir)?;
    }
    fs::create_dir_all(&work_dir)?;

    let mut items = vec![(&ballot.post.text, &ballot.post.image_ref)];
    items.extend(ballot.comments.iter().map(|c| (&c.text, &c.image_ref)));

    let mut segments = Vec::new();
    let mut cursor = 0.0_f64;
    for (i, (text, image)) in items.into_iter().enumerate() {
        let image = image
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Segment {} has no image", i))?;
        let audio = work_dir.join(format!("part_{:03}.wav", i));
        info!("Generating narration {}/{}", i + 1, ballot.comments.len() + 1);
        tts_generate(&opts.piper_model, text, &audio)?;
        let duration = wav_duration_seconds(&audio)? + SEGMENT_PAUSE;
        debug!("Segment {} lasts {:.2} seconds", i, duration);
        segments.push(Segment {
            image: image.clone(),
            audio,
            start: cursor,
            duration,
        });
        cursor += duration;
    }

    let mut clips = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        let clip = work_dir.join(format!("clip_{:03}.mp4", i));
        run_ffmpeg(&segment_args(&opts.background, segment, &clip), None)?;
        clips.push(clip);
    }

    let concat_list = work_dir.join("files.txt");
    {
        let mut f = File::create(&concat_list)?;
        for clip in &clips {
            let fname = clip
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("Invalid filename"))?;
            writeln!(f, "file '{}'", fname)?;
        }
    }
    let combined = work_dir.join("combined.mp4");
    info!("Concatenating {} clips into {}", clips.len(), combined.display());
    run_ffmpeg(
        &strings(&[
            "-y", "-f", "concat", "-safe", "0", "-i", "files.txt", "-c", "copy", "combined.mp4",
        ]),
        Some(&work_dir),
    )?;

    let out = opts.out_dir.join(format!("{}.mp4", ballot.post.id));
    match &opts.music {
        Some(music) if music.exists() => {
            info!("Mixing background music {}", music.display());
            run_ffmpeg(&music_args(&combined, music, &out), None)?;
        }
        Some(music) => {
            warn!("Music track {} not found; skipping", music.display());
            fs::rename(&combined, &out)?;
        }
        None => fs::rename(&combined, &out)?,
    }
    info!("Final video written to {} ({:.1}s)", out.display(), cursor);
    Ok(out)
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

pub fn segment_args(background: &Path, segment: &Segment, out: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", segment.start),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        background.display().to_string(),
        "-loop".to_string(),
        "1".to_string(),
        "-i".to_string(),
        segment.image.display().to_string(),
        "-i".to_string(),
        segment.audio.display().to_string(),
        "-filter_complex".to_string(),
        "[0:v]scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920[bg];\
         [1:v]scale=960:-2[img];[bg][img]overlay=(W-w)/2:(H-h)/2[v];[2:a]apad[a]"
            .to_string(),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-t".to_string(),
        format!("{:.3}", segment.duration),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        "30".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        out.display().to_string(),
    ]
}

pub fn music_args(video: &Path, music: &Path, out: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        music.display().to_string(),
        "-filter_complex".to_string(),
        format!(
            "[1:a]volume={}[m];[0:a][m]amix=inputs=2:duration=first:normalize=0[a]",
            MUSIC_VOLUME
        ),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        out.display().to_string(),
    ]
}

fn run_ffmpeg(args: &[String], dir: Option<&Path>) -> anyhow::Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let status = cmd.status()?;
    if !status.success() {
        error!("ffmpeg failed: {:?}", args);
        anyhow::bail!("ffmpeg exited with {}", status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_starts_background_at_offset() {
        let segment = Segment {
            image: PathBuf::from("images/p.png"),
            audio: PathBuf::from("tmp/part_000.wav"),
            start: 12.5,
            duration: 3.25,
        };
        let args = segment_args(Path::new("res/bg.mp4"), &segment, Path::new("tmp/clip.mp4"));
        assert_eq!(&args[1..3], &["-ss".to_string(), "12.500".to_string()]);
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "3.250");
        assert_eq!(args.last().unwrap(), "tmp/clip.mp4");
    }

    #[test]
    fn music_is_mixed_under_narration() {
        let args = music_args(
            Path::new("combined.mp4"),
            Path::new("music.mp3"),
            Path::new("out.mp4"),
        );
        assert!(args.iter().any(|a| a.contains("volume=0.15")));
        assert!(args.iter().any(|a| a.contains("duration=first")));
    }

    #[test]
    fn missing_background_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ballot = crate::ballot::tests::sample_ballot(&["A1"]);
        let opts = VideoOptions {
            background: dir.path().join("nope.mp4"),
            music: None,
            piper_model: "model.onnx".into(),
            out_dir: dir.path().to_path_buf(),
        };
        let err = make_video(&ballot, &opts).unwrap_err();
        assert!(err.to_string().contains("Background video not found"));
    }
}
