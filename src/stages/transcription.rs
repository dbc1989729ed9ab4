//! Speech-to-text stage.

use std::path::Path;

use tracing::{debug, info};

use super::StageContext;
use crate::adapters::{Lazy, Segment, SpeechToText, TranscribeOptions};
use crate::error::{PipelineError, Result};

/// Reject missing or implausibly small recordings; returns the file size
pub async fn validate_input(audio: &Path, min_bytes: u64) -> Result<u64> {
    let meta = tokio::fs::metadata(audio)
        .await
        .map_err(|_| PipelineError::Input(format!("audio file not found: {}", audio.display())))?;

    if !meta.is_file() {
        return Err(PipelineError::Input(format!(
            "not a regular file: {}",
            audio.display()
        )));
    }
    if meta.len() < min_bytes {
        return Err(PipelineError::Input(format!(
            "audio file too small ({} bytes, minimum {})",
            meta.len(),
            min_bytes
        )));
    }
    Ok(meta.len())
}

/// Trim each segment, drop blanks, join with single spaces
pub fn join_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run the speech engine over `audio` and return the raw transcript
pub async fn transcribe<S: SpeechToText>(
    engine: &mut Lazy<S>,
    audio: &Path,
    options: &TranscribeOptions,
    ctx: &StageContext<'_>,
) -> Result<String> {
    let span = ctx.plan().transcription;
    let bytes = validate_input(audio, ctx.settings.min_audio_bytes).await?;

    ctx.report(span.start, "transcribing audio").await?;

    let engine = engine.get().map_err(PipelineError::engine)?;
    debug!(engine = engine.name(), bytes, "Transcribing");
    let segments = engine
        .transcribe(audio, options)
        .await
        .map_err(PipelineError::engine)?;

    let text = join_segments(&segments);
    if text.is_empty() {
        return Err(PipelineError::Engine(
            "speech engine returned no text".to_string(),
        ));
    }
    info!(segments = segments.len(), chars = text.chars().count(), "Transcription finished");

    ctx.report(span.end, "transcription finished").await?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ScriptedSpeech;
    use crate::config::PipelineSettings;
    use crate::core::TaskStore;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn processing_task(temp: &TempDir) -> (TaskStore, Uuid) {
        let store = TaskStore::open(temp.path().join("tasks.jsonl")).await.unwrap();
        let id = Uuid::new_v4();
        store
            .create(id, "alice", "rec.webm", &temp.path().join("rec.webm"))
            .await
            .unwrap();
        store.mark_processing(id).await.unwrap();
        (store, id)
    }

    #[test]
    fn test_join_segments() {
        let segments = vec![
            Segment::new(0.0, "  Selamat pagi. "),
            Segment::new(1.5, "   "),
            Segment::new(2.0, "Apa kabar?"),
        ];
        assert_eq!(join_segments(&segments), "Selamat pagi. Apa kabar?");
        assert_eq!(join_segments(&[]), "");
    }

    #[tokio::test]
    async fn test_validate_input() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.webm");
        assert!(matches!(
            validate_input(&missing, 100).await,
            Err(PipelineError::Input(_))
        ));

        let small = temp.path().join("small.webm");
        std::fs::write(&small, [0u8; 99]).unwrap();
        let err = validate_input(&small, 100).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input audio: audio file too small (99 bytes, minimum 100)"
        );

        std::fs::write(&small, [0u8; 100]).unwrap();
        assert_eq!(validate_input(&small, 100).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_transcribe_reports_stage_bounds() {
        let temp = TempDir::new().unwrap();
        let (store, id) = processing_task(&temp).await;
        let audio = temp.path().join("rec.webm");
        std::fs::write(&audio, [1u8; 256]).unwrap();

        let settings = PipelineSettings::default();
        let ctx = StageContext::new(&store, id, &settings);
        let mut engine = Lazy::ready("speech", ScriptedSpeech::from_texts(&["halo", " dunia "]));

        let text = transcribe(&mut engine, &audio, &TranscribeOptions::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(text, "halo dunia");

        let progress: Vec<u8> = store
            .history(id)
            .await
            .unwrap()
            .iter()
            .filter_map(|e| e.progress())
            .collect();
        assert_eq!(progress, vec![10, 30]);
    }

    #[tokio::test]
    async fn test_blank_output_is_an_engine_error() {
        let temp = TempDir::new().unwrap();
        let (store, id) = processing_task(&temp).await;
        let audio = temp.path().join("rec.webm");
        std::fs::write(&audio, [1u8; 256]).unwrap();

        let settings = PipelineSettings::default();
        let ctx = StageContext::new(&store, id, &settings);
        let mut engine = Lazy::ready("speech", ScriptedSpeech::from_texts(&["  ", ""]));

        let err = transcribe(&mut engine, &audio, &TranscribeOptions::default(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Engine(_)));
    }

    #[tokio::test]
    async fn test_input_is_checked_before_the_engine_runs() {
        let temp = TempDir::new().unwrap();
        let (store, id) = processing_task(&temp).await;

        let settings = PipelineSettings::default();
        let ctx = StageContext::new(&store, id, &settings);
        let speech = ScriptedSpeech::from_texts(&["never"]);
        let log = speech.log();
        let mut engine = Lazy::ready("speech", speech);

        let err = transcribe(
            &mut engine,
            &temp.path().join("rec.webm"),
            &TranscribeOptions::default(),
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
        assert!(log.is_empty());
        assert_eq!(store.get(id).await.unwrap().progress, 0);
    }
}
