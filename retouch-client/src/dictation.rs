use std::path::Path;

use anyhow::{ensure, Result};
use tokio::process::Command;

/// Records a spoken command from the microphone and transcribes it.
///
/// Recording uses `rec` (from sox) and stops after three seconds of silence;
/// transcription uses the `whisper` command-line tool with the given ggml model.
pub async fn take_dictation(whisper_model: &Path) -> Result<String> {
    // TODO: load the whisper model in-process instead of shelling out to `rec` and `whisper`.
    let temp_dir = tempfile::tempdir()?;
    let temp_wav = temp_dir.path().join("command.wav");
    let status = Command::new("rec")
        .arg(&temp_wav)
        .args("rate 16k silence 1 0.1 3% 1 3.0 3%".split_whitespace())
        .status()
        .await?;
    ensure!(status.success(), "Dictation recording failed.");

    let output = Command::new("whisper")
        .arg("-nt")
        .arg("-m")
        .arg(whisper_model)
        .arg(&temp_wav)
        .output()
        .await?;
    ensure!(output.status.success(), "Transcription failed.");

    Ok(clean_transcript(&String::from_utf8_lossy(&output.stdout)))
}

/// Whisper prints one segment per line, sometimes with bracketed annotations like `[BLANK_AUDIO]`.
fn clean_transcript(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !(line.starts_with('[') && line.ends_with(']')))
        .collect::<Vec<_>>()
        .join(" ")
}
