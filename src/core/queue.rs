//! Submission queue bridging "task created" to "task picked up".
//!
//! The durable record is written first; the channel entry only tells the
//! worker which record to pick up next. A record whose entry never reaches
//! the worker stays `queued` and is picked up by the next reconciliation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::task_store::TaskStore;
use crate::domain::file_name_of;
use crate::error::{PipelineError, Result};

/// Transient work item; the task store is authoritative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub task_id: Uuid,
    pub audio_ref: PathBuf,
    pub owner: String,
}

/// Receiving half, owned by the worker
pub type QueueReceiver = mpsc::UnboundedReceiver<QueueEntry>;

/// Producer side of the queue; cheap to clone
#[derive(Debug, Clone)]
pub struct SubmissionQueue {
    tasks: Arc<TaskStore>,
    tx: mpsc::UnboundedSender<QueueEntry>,
}

/// Create a connected queue and receiver
pub fn channel(tasks: Arc<TaskStore>) -> (SubmissionQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SubmissionQueue { tasks, tx }, rx)
}

impl SubmissionQueue {
    /// Submit saved audio; the filename doubles as the source name
    pub async fn submit(&self, owner: &str, audio_ref: &Path) -> Result<Uuid> {
        self.submit_named(owner, audio_ref, &file_name_of(audio_ref)).await
    }

    /// Submit saved audio that was stored under a different name than uploaded
    pub async fn submit_named(&self, owner: &str, audio_ref: &Path, source_name: &str) -> Result<Uuid> {
        if self.is_closed() {
            return Err(PipelineError::QueueClosed);
        }

        let task_id = Uuid::new_v4();
        self.tasks
            .create(task_id, owner, source_name, audio_ref)
            .await?;

        self.send(task_id, audio_ref, owner)?;
        info!(%task_id, owner, source = source_name, "Task queued");
        Ok(task_id)
    }

    /// Re-enqueue an existing queued record (startup reconciliation)
    pub(crate) fn requeue(&self, task_id: Uuid, audio_ref: &Path, owner: &str) -> Result<()> {
        self.send(task_id, audio_ref, owner)
    }

    fn send(&self, task_id: Uuid, audio_ref: &Path, owner: &str) -> Result<()> {
        let entry = QueueEntry {
            task_id,
            audio_ref: audio_ref.to_path_buf(),
            owner: owner.to_string(),
        };
        self.tx.send(entry).map_err(|_| {
            warn!(%task_id, "Worker stopped before the task was enqueued; left queued for restart");
            PipelineError::QueueClosed
        })
    }

    /// Whether the worker has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }
}
