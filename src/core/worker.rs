//! The single background worker.
//!
//! Dequeues one entry at a time and drives it through every stage. The
//! worker owns its collaborators outright, so pipelines never overlap and
//! no engine is ever shared. A failing task is recorded and the loop
//! moves on; nothing a task does can stop the worker.
//!
//! When given a [`WorkerLock`] the worker keeps it until its loop ends, so
//! no second worker can reconcile the same store while this one runs.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::lock::WorkerLock;
use super::queue::{QueueEntry, QueueReceiver};
use super::result_store::ResultStore;
use super::task_store::TaskStore;
use crate::adapters::{Lazy, SpeechToText, TextGenerator, TranscribeOptions};
use crate::config::{PipelineSettings, WhisperSettings};
use crate::domain::{ParticipantMetadata, Transcript};
use crate::error::Result;
use crate::stages::{self, StageContext};

/// Lazily built speech engine, owned by the worker
pub type SpeechCell = Lazy<Box<dyn SpeechToText>>;

/// Lazily built text generator, owned by the worker
pub type GeneratorCell = Lazy<Box<dyn TextGenerator>>;

/// Background executor for queued tasks
pub struct Worker {
    tasks: Arc<TaskStore>,
    results: Arc<ResultStore>,
    rx: QueueReceiver,
    speech: SpeechCell,
    generator: GeneratorCell,
    settings: PipelineSettings,
    options: TranscribeOptions,
    lock: Option<WorkerLock>,
}

/// Handle to a spawned worker
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to stop after its current task and wait for it
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "Worker task panicked");
        }
    }
}

impl Worker {
    pub fn new(
        tasks: Arc<TaskStore>,
        results: Arc<ResultStore>,
        rx: QueueReceiver,
        speech: SpeechCell,
        generator: GeneratorCell,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            tasks,
            results,
            rx,
            speech,
            generator,
            settings,
            options: TranscribeOptions::default(),
            lock: None,
        }
    }

    /// Hold the store's worker lock until the loop ends
    pub fn with_lock(mut self, lock: WorkerLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Language hint and VAD toggle passed to the speech engine
    pub fn with_transcribe_options(mut self, options: TranscribeOptions) -> Self {
        self.options = options;
        self
    }

    /// Take the speech options from whisper settings
    pub fn with_whisper_settings(self, whisper: &WhisperSettings) -> Self {
        self.with_transcribe_options(TranscribeOptions {
            language: whisper.language.clone(),
            vad: whisper.vad,
        })
    }

    /// Run the loop on its own tokio task
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle { shutdown_tx, join }
    }

    /// Process entries until shutdown is signalled or every sender is gone
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) {
        info!(
            speech = self.speech.name(),
            generator = self.generator.name(),
            "Worker started"
        );
        let poll = self.settings.poll_interval();

        loop {
            if *shutdown.borrow() {
                info!("Worker shutting down");
                break;
            }

            match tokio::time::timeout(poll, self.rx.recv()).await {
                Ok(Some(entry)) => self.handle(entry).await,
                Ok(None) => {
                    info!("Submission queue closed, worker stopping");
                    break;
                }
                Err(_) => continue,
            }
        }

        if let Some(lock) = self.lock.take() {
            debug!(path = %lock.path().display(), "Releasing worker lock");
        }
    }

    /// Process one entry and record its outcome; never fails
    async fn handle(&mut self, entry: QueueEntry) {
        let task_id = entry.task_id;
        let release_input = match self.process(&entry).await {
            Ok(()) => true,
            Err(e) => {
                error!(%task_id, error = %e, "Task failed");
                if let Err(store_err) = self.tasks.mark_failed(task_id, &e.to_string()).await {
                    error!(%task_id, error = %store_err, "Failed to record task failure");
                }
                self.settings.release_failed_input
            }
        };

        if release_input {
            release(&entry.audio_ref).await;
        }
    }

    /// Run every stage for one task
    #[instrument(skip(self, entry), fields(task_id = %entry.task_id, owner = %entry.owner))]
    async fn process(&mut self, entry: &QueueEntry) -> Result<()> {
        let task = self.tasks.mark_processing(entry.task_id).await?;
        info!(source = %task.source_name, "Processing task");

        let ctx = StageContext::new(&self.tasks, entry.task_id, &self.settings);

        let raw = stages::transcribe(&mut self.speech, &entry.audio_ref, &self.options, &ctx).await?;
        let formatted = stages::reformat(&mut self.generator, &raw, &ctx).await?;
        let metadata = stages::extract_metadata(&mut self.generator, &formatted, &ctx).await?;

        let span = ctx.plan().persistence;
        ctx.report(span.start, "saving result").await?;
        let transcript = Transcript::new(
            entry.owner.clone(),
            task.source_name,
            entry.task_id,
            ParticipantMetadata::from(&metadata),
            formatted,
        );
        let result_id = persist(&self.tasks, &self.results, entry.task_id, transcript).await?;
        info!(%result_id, "Task completed");
        Ok(())
    }
}

/// Save the transcript and mark its task completed.
///
/// A result is only visible while its task says `completed`; if the task
/// update fails the saved transcript is withdrawn again.
async fn persist(
    tasks: &TaskStore,
    results: &ResultStore,
    task_id: Uuid,
    transcript: Transcript,
) -> Result<Uuid> {
    let result_id = results.save(transcript).await?;
    debug!(%result_id, "Result saved");

    if let Err(e) = tasks.mark_completed(task_id, result_id).await {
        warn!(%task_id, %result_id, error = %e, "Completion not recorded, discarding result");
        if let Err(discard_err) = results.discard(result_id).await {
            error!(%result_id, error = %discard_err, "Failed to discard orphaned result");
        }
        return Err(e.into());
    }
    Ok(result_id)
}

/// Delete a processed input; failures only warn
async fn release(audio: &Path) {
    match tokio::fs::remove_file(audio).await {
        Ok(()) => debug!(path = %audio.display(), "Released input audio"),
        Err(e) => warn!(path = %audio.display(), error = %e, "Failed to release input audio"),
    }
}
