//! Error taxonomy for the transcription pipeline.
//!
//! Stage code returns [`PipelineError`]. Any error reaching the worker
//! fails the task; the metadata stage recovers its own parse and engine
//! errors before they get that far.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::TaskStatus;

/// Errors raised while a task moves through the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input audio is missing, empty or too small to be a recording
    #[error("invalid input audio: {0}")]
    Input(String),

    /// A collaborator failed, could not be constructed, or returned unusable output
    #[error("engine error: {0}")]
    Engine(String),

    /// Model output could not be interpreted (recovered by the metadata stage)
    #[error("could not parse model output: {0}")]
    Parse(String),

    /// A durable write failed or would break a task invariant
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker side of the submission queue is gone
    #[error("submission queue is closed")]
    QueueClosed,
}

impl PipelineError {
    /// Wrap any collaborator failure as an engine error, keeping the cause chain
    pub fn engine(err: impl std::fmt::Display) -> Self {
        Self::Engine(format!("{:#}", err))
    }
}

/// Errors from the durable task and result stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("task already exists: {0}")]
    TaskExists(Uuid),

    #[error("invalid state transition for task {id}: {from} → {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("progress for task {id} would go backwards: {from} → {to}")]
    ProgressRegression { id: Uuid, from: u8, to: u8 },

    #[error("another worker already owns this store (lock held on {})", .0.display())]
    Locked(std::path::PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
