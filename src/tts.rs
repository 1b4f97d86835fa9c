use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use tracing::{error, info};

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link regex"));
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*_~^>#`]+").expect("valid emphasis regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid space regex"));

/// Reduces reddit markdown to what should be read aloud.
pub fn narration_text(text: &str) -> String {
    let text = MARKDOWN_LINK.replace_all(text, "$1");
    let text = BARE_URL.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");
    SPACES.replace_all(&text, " ").trim().to_string()
}

/// Synthesises `text` to a WAV file with Piper.
pub fn tts_generate(model: &str, text: &str, out_path: &Path) -> anyhow::Result<()> {
    info!("Calling Piper TTS for output file {}", out_path.display());
    let mut child = Command::new("piper")
        .arg("--model")
        .arg(model)
        .arg("--output_file")
        .arg(out_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()?;

    {
        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Failed to open piper stdin"))?;
        stdin.write_all(narration_text(text).as_bytes())?;
    }

    let status = child.wait()?;
    if !status.success() {
        error!("Piper TTS command failed for {}", out_path.display());
        anyhow::bail!("TTS engine failed, command returned non-zero");
    }
    Ok(())
}
