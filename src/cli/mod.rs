//! Command-line interface for scribe.
//!
//! Provides commands for transcribing recordings, checking task status,
//! browsing and deleting finished transcripts, and reconciling tasks
//! left over from an earlier process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{Lazy, LlamaServer, SpeechToText, TextGenerator, WhisperCli};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    self, GeneratorCell, ResultStore, SpeechCell, StatusApi, SubmissionQueue, TaskSnapshot,
    TaskStore, Worker, WorkerHandle, WorkerLock,
};
use crate::domain::{file_name_of, TaskStatus, Transcript};
use crate::error::StoreError;

/// How often `run` polls task status while waiting
const POLL_EVERY: Duration = Duration::from_millis(500);

/// scribe - queued interview transcription
#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe one or more recordings and wait for the results
    Run {
        /// Audio files to submit, processed in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Submitting user
        #[arg(short, long)]
        owner: String,
    },

    /// Check the status of a task
    Status {
        /// Task ID (UUID)
        task_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List an owner's queued and processing tasks
    Active {
        #[arg(short, long)]
        owner: String,
    },

    /// List an owner's finished transcripts
    Results {
        #[arg(short, long)]
        owner: String,
    },

    /// Print a finished transcript
    Show {
        /// Result ID (UUID)
        result_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a finished transcript
    Delete {
        /// Result ID (UUID)
        result_id: String,

        /// Owner of the transcript
        #[arg(short, long)]
        owner: String,
    },

    /// Requeue or fail tasks left over from an earlier process, then drain the queue
    Reconcile,

    /// Show current configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run { files, owner } => run_files(&files, &owner).await,
            Commands::Status { task_id, json } => show_status(&task_id, json).await,
            Commands::Active { owner } => list_active(&owner).await,
            Commands::Results { owner } => list_results(&owner).await,
            Commands::Show { result_id, json } => show_result(&result_id, json).await,
            Commands::Delete { result_id, owner } => delete_result(&result_id, &owner).await,
            Commands::Reconcile => reconcile().await,
            Commands::Config => show_config(),
        }
    }
}

/// Stores opened from the configured home directory
struct Stores {
    tasks: Arc<TaskStore>,
    results: Arc<ResultStore>,
}

impl Stores {
    async fn open(cfg: &ResolvedConfig) -> Result<Self> {
        let tasks = TaskStore::open(cfg.tasks_path())
            .await
            .with_context(|| format!("Failed to open task store: {}", cfg.tasks_path().display()))?;
        let results = ResultStore::open(cfg.results_path())
            .await
            .with_context(|| format!("Failed to open result store: {}", cfg.results_path().display()))?;
        Ok(Self {
            tasks: Arc::new(tasks),
            results: Arc::new(results),
        })
    }

    fn status(&self) -> StatusApi {
        StatusApi::new(self.tasks.clone(), self.results.clone())
    }
}

/// A running worker plus the queue that feeds it
struct Pipeline {
    queue: SubmissionQueue,
    worker: WorkerHandle,
    recovered: Vec<Uuid>,
}

/// Claim the store for this process; taken before the stores are opened
async fn claim_worker(cfg: &ResolvedConfig) -> Result<WorkerLock> {
    match WorkerLock::acquire(cfg.worker_lock_path()).await {
        Ok(lock) => Ok(lock),
        Err(StoreError::Locked(_)) => anyhow::bail!(
            "Another scribe worker is already running on {}",
            cfg.home.display()
        ),
        Err(e) => Err(e).context("Failed to take the worker lock"),
    }
}

/// Reconcile leftovers, then start the worker; it holds `lock` until it stops
async fn start_pipeline(cfg: &ResolvedConfig, stores: &Stores, lock: WorkerLock) -> Result<Pipeline> {
    let (queue, rx) = core::channel(stores.tasks.clone());
    let report = core::reconcile(&queue, &lock)
        .await
        .context("Failed to reconcile leftover tasks")?;
    for id in &report.failed {
        eprintln!("[Task {} marked failed: left over from an earlier run]", id);
    }

    let whisper = cfg.whisper.clone();
    let speech: SpeechCell = Lazy::new("whisper", move || {
        Ok(Box::new(WhisperCli::from_settings(&whisper)) as Box<dyn SpeechToText>)
    });

    let llama = cfg.llama.clone();
    let generator: GeneratorCell = Lazy::new("llama", move || {
        Ok(Box::new(LlamaServer::from_settings(&llama)?) as Box<dyn TextGenerator>)
    });

    let worker = Worker::new(
        stores.tasks.clone(),
        stores.results.clone(),
        rx,
        speech,
        generator,
        cfg.pipeline.clone(),
    )
    .with_whisper_settings(&cfg.whisper)
    .with_lock(lock)
    .spawn();

    Ok(Pipeline {
        queue,
        worker,
        recovered: report.requeued,
    })
}

/// Copy an input into the uploads directory under a collision-free name
async fn save_upload(uploads: &Path, source: &Path) -> Result<PathBuf> {
    let name = file_name_of(source);
    let prefix = Uuid::new_v4().simple().to_string();
    let target = uploads.join(format!("{}_{}", &prefix[..8], name));

    tokio::fs::copy(source, &target)
        .await
        .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
    Ok(target)
}

/// Poll until every task is terminal, printing each change
async fn wait_for(status: &StatusApi, ids: &[Uuid]) -> Vec<TaskSnapshot> {
    let mut last_seen: HashMap<Uuid, (TaskStatus, u8, String)> = HashMap::new();

    loop {
        let mut snapshots = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(snapshot) = status.get_status(*id).await {
                let seen = (snapshot.status, snapshot.progress, snapshot.message.clone());
                if last_seen.get(id) != Some(&seen) {
                    eprintln!(
                        "[{}] {:>3}% {:<10} {}",
                        snapshot.source_name, snapshot.progress, snapshot.status, snapshot.message
                    );
                    last_seen.insert(*id, seen);
                }
                snapshots.push(snapshot);
            }
        }

        if snapshots.iter().all(|s| s.status.is_terminal()) {
            return snapshots;
        }
        tokio::time::sleep(POLL_EVERY).await;
    }
}

fn report_outcomes(snapshots: &[TaskSnapshot]) -> bool {
    let mut all_ok = true;
    for snapshot in snapshots {
        match (&snapshot.status, &snapshot.result_id) {
            (TaskStatus::Completed, Some(result_id)) => {
                eprintln!("[Task {} completed: result {}]", snapshot.id, result_id);
            }
            _ => {
                all_ok = false;
                eprintln!(
                    "[Task {} failed: {}]",
                    snapshot.id,
                    snapshot.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    all_ok
}

/// Submit files and wait for them to finish
async fn run_files(files: &[PathBuf], owner: &str) -> Result<()> {
    let cfg = config::config()?;
    let lock = claim_worker(cfg).await?;
    let stores = Stores::open(cfg).await?;

    let uploads = cfg.uploads_dir();
    tokio::fs::create_dir_all(&uploads)
        .await
        .with_context(|| format!("Failed to create uploads directory: {}", uploads.display()))?;

    let pipeline = start_pipeline(cfg, &stores, lock).await?;

    let mut ids = pipeline.recovered.clone();
    for file in files {
        let saved = save_upload(&uploads, file).await?;
        let id = pipeline
            .queue
            .submit_named(owner, &saved, &file_name_of(file))
            .await?;
        eprintln!("[Task {} queued: {}]", id, file.display());
        ids.push(id);
    }

    let snapshots = wait_for(&stores.status(), &ids).await;
    pipeline.worker.shutdown().await;

    if !report_outcomes(&snapshots) {
        std::process::exit(1);
    }
    Ok(())
}

/// Run reconciliation and process whatever it requeued
async fn reconcile() -> Result<()> {
    let cfg = config::config()?;
    let lock = claim_worker(cfg).await?;
    let stores = Stores::open(cfg).await?;
    let pipeline = start_pipeline(cfg, &stores, lock).await?;

    if pipeline.recovered.is_empty() {
        println!("Nothing to requeue");
        pipeline.worker.shutdown().await;
        return Ok(());
    }

    println!("Requeued {} task(s)", pipeline.recovered.len());
    let snapshots = wait_for(&stores.status(), &pipeline.recovered).await;
    pipeline.worker.shutdown().await;

    if !report_outcomes(&snapshots) {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_id(kind: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {} ID: {}", kind, value))
}

/// Show the status of a task
async fn show_status(task_id: &str, json: bool) -> Result<()> {
    let task_id = parse_id("task", task_id)?;
    let stores = Stores::open(config::config()?).await?;

    let snapshot = stores
        .status()
        .get_status(task_id)
        .await
        .with_context(|| format!("Task not found: {}", task_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Task ID: {}", snapshot.id);
    println!("Owner: {}", snapshot.owner);
    println!("Source: {}", snapshot.source_name);
    println!("Status: {}", snapshot.status);
    println!("Progress: {}%", snapshot.progress);
    println!("Message: {}", snapshot.message);
    println!("Created: {}", snapshot.created_at);
    println!("Updated: {}", snapshot.updated_at);
    if let Some(error) = &snapshot.error {
        println!("Error: {}", error);
    }
    if let Some(result_id) = snapshot.result_id {
        let note = if snapshot.result.is_some() { "" } else { " (deleted)" };
        println!("Result: {}{}", result_id, note);
    }

    Ok(())
}

/// List an owner's active tasks
async fn list_active(owner: &str) -> Result<()> {
    let stores = Stores::open(config::config()?).await?;
    let active = stores.status().list_active(owner).await;

    if active.is_empty() {
        println!("No active tasks");
        return Ok(());
    }

    println!("{:<38} {:<12} {:>5}  {}", "TASK ID", "STATUS", "PCT", "SOURCE");
    println!("{}", "-".repeat(80));
    for task in active {
        println!(
            "{:<38} {:<12} {:>4}%  {}",
            task.id, task.status, task.progress, task.source_name
        );
    }

    Ok(())
}

/// List an owner's transcripts
async fn list_results(owner: &str) -> Result<()> {
    let stores = Stores::open(config::config()?).await?;
    let results = stores.status().list_results(owner).await;

    if results.is_empty() {
        println!("No transcripts");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<12} {}", "RESULT ID", "CREATED", "CODE", "SOURCE");
    println!("{}", "-".repeat(90));
    for t in results {
        println!(
            "{:<38} {:<20} {:<12} {}",
            t.id,
            t.created_at.format("%Y-%m-%d %H:%M"),
            t.metadata.code,
            t.source_file
        );
    }

    Ok(())
}

fn print_transcript(t: &Transcript) {
    println!("Result ID: {}", t.id);
    println!("Source: {}", t.source_file);
    println!("Task: {}", t.task_id);
    println!("Created: {}", t.created_at);
    println!();
    println!("Participant:");
    println!("  Code:      {}", t.metadata.code);
    println!("  Name:      {}", t.metadata.name);
    println!("  Age:       {}", t.metadata.age);
    println!("  Education: {}", t.metadata.education);
    println!();
    println!("{}", t.content);
}

/// Print a transcript
async fn show_result(result_id: &str, json: bool) -> Result<()> {
    let result_id = parse_id("result", result_id)?;
    let stores = Stores::open(config::config()?).await?;

    let transcript = stores
        .status()
        .get_result(result_id)
        .await
        .with_context(|| format!("Result not found: {}", result_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
    } else {
        print_transcript(&transcript);
    }
    Ok(())
}

/// Delete an owner's transcript
async fn delete_result(result_id: &str, owner: &str) -> Result<()> {
    let result_id = parse_id("result", result_id)?;
    let stores = Stores::open(config::config()?).await?;

    if stores.results.delete(result_id, owner).await? {
        println!("Deleted {}", result_id);
        Ok(())
    } else {
        anyhow::bail!("No transcript {} owned by {}", result_id, owner)
    }
}

/// Show current configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Home:    {}", cfg.home.display());
    println!("  Tasks:   {}", cfg.tasks_path().display());
    println!("  Results: {}", cfg.results_path().display());
    println!("  Uploads: {}", cfg.uploads_dir().display());
    println!();
    println!("Pipeline:");
    println!("  Chunk size:        {} chars", cfg.pipeline.chunk_chars);
    println!("  Chunk max tokens:  {}", cfg.pipeline.chunk_max_tokens);
    println!("  Metadata prefix:   {} chars", cfg.pipeline.metadata_prefix_chars);
    println!("  Min audio size:    {} bytes", cfg.pipeline.min_audio_bytes);
    println!("  Release failed:    {}", cfg.pipeline.release_failed_input);
    println!("  Progress plan:");
    for (stage, span) in cfg.pipeline.progress.ordered() {
        println!("    {:<14} {:>3} -> {:>3}", stage, span.start, span.end);
    }
    println!();
    println!("Speech-to-text:");
    println!("  Binary:   {}", cfg.whisper.binary);
    println!("  Model:    {}", cfg.whisper.model);
    println!("  Language: {}", cfg.whisper.language.as_deref().unwrap_or("(auto)"));
    println!("  VAD:      {}", cfg.whisper.vad);
    println!();
    println!("Text generation:");
    println!("  Server:  {}", cfg.llama.base_url);
    println!("  Timeout: {}s", cfg.llama.timeout_seconds);

    Ok(())
}
