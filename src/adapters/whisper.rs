//! Whisper speech-to-text backend.
//!
//! Shells out to a local whisper-compatible binary (openai-whisper,
//! whisper-ctranslate2) and reads its JSON segment output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{Segment, SpeechToText, TranscribeOptions};
use crate::config::WhisperSettings;

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    start: f64,
    text: String,
}

/// Whisper CLI adapter
#[derive(Debug, Clone)]
pub struct WhisperCli {
    binary_path: PathBuf,
    model: String,
    timeout: Duration,
}

impl WhisperCli {
    pub fn new(binary_path: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model: model.into(),
            timeout: Duration::from_secs(3600),
        }
    }

    pub fn from_settings(settings: &WhisperSettings) -> Self {
        Self::new(&settings.binary, &settings.model)
            .with_timeout(Duration::from_secs(settings.timeout_seconds))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, audio: &Path, output_dir: &Path, options: &TranscribeOptions) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg(audio)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(output_dir)
            .arg("--output_format")
            .arg("json");
        if let Some(language) = &options.language {
            cmd.arg("--language").arg(language);
        }
        if options.vad {
            cmd.arg("--vad_filter").arg("True");
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        cmd
    }
}

/// Parse whisper's JSON output into segments
fn parse_output(json: &str) -> Result<Vec<Segment>> {
    let output: WhisperOutput = serde_json::from_str(json).context("Failed to parse whisper JSON")?;
    Ok(output
        .segments
        .into_iter()
        .map(|s| Segment::new(s.start, s.text))
        .collect())
}

#[async_trait]
impl SpeechToText for WhisperCli {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&mut self, audio: &Path, options: &TranscribeOptions) -> Result<Vec<Segment>> {
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

        debug!(audio = %audio.display(), model = %self.model, "Running whisper");
        let output = timeout(
            self.timeout,
            self.command(audio, temp_dir.path(), options).output(),
        )
        .await
        .with_context(|| format!("Whisper timed out after {:?}", self.timeout))?
        .with_context(|| format!("Failed to run whisper at {}", self.binary_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr.trim());
        }

        let stem = audio.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        parse_output(&json_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments_in_order() {
        let json = r#"{
            "text": " Selamat pagi. Apa kabar?",
            "language": "id",
            "segments": [
                {"id": 0, "start": 0.0, "end": 1.5, "text": " Selamat pagi."},
                {"id": 1, "start": 1.5, "end": 3.0, "text": " Apa kabar?"}
            ]
        }"#;

        let segments = parse_output(json).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::new(0.0, " Selamat pagi."),
                Segment::new(1.5, " Apa kabar?"),
            ]
        );
    }

    #[test]
    fn test_parse_without_segments() {
        assert!(parse_output(r#"{"text": ""}"#).unwrap().is_empty());
        assert!(parse_output("not json").is_err());
    }

    #[test]
    fn test_command_flags() {
        let cli = WhisperCli::new("/opt/whisper", "medium");
        let options = TranscribeOptions {
            language: Some("id".to_string()),
            vad: true,
        };
        let cmd = cli.command(Path::new("/in/a.webm"), Path::new("/out"), &options);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(
            args,
            vec![
                "/in/a.webm", "--model", "medium", "--output_dir", "/out", "--output_format",
                "json", "--language", "id", "--vad_filter", "True",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let mut cli = WhisperCli::new("/nonexistent/whisper-binary", "tiny");
        let result = cli
            .transcribe(Path::new("/tmp/none.webm"), &TranscribeOptions::default())
            .await;
        assert!(result.is_err());
    }
}
