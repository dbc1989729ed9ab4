//! Startup reconciliation of tasks left over from a previous process.
//!
//! The queue lives in memory, so after a restart the task log can hold
//! records no worker will ever pick up. Run [`reconcile`] once, holding
//! the store's [`WorkerLock`] and before the worker starts, to put every
//! such record back on a live path.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::lock::WorkerLock;
use super::queue::SubmissionQueue;
use crate::domain::TaskStatus;
use crate::error::Result;

/// Error recorded on tasks that were mid-pipeline when the process stopped
pub const INTERRUPTED: &str = "interrupted by restart";

/// What reconciliation did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Queued tasks put back on the queue, in creation order
    pub requeued: Vec<Uuid>,
    /// Interrupted tasks marked failed
    pub failed: Vec<Uuid>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

/// Fail stale `processing` tasks and requeue stale `queued` ones.
///
/// Queued tasks go back on the queue as they are; one whose audio has
/// vanished fails input validation when the worker reaches it.
pub async fn reconcile(queue: &SubmissionQueue, _lock: &WorkerLock) -> Result<ReconcileReport> {
    let tasks = queue.tasks();
    let mut report = ReconcileReport::default();

    for task in tasks.with_status(TaskStatus::Processing).await {
        warn!(task_id = %task.id, "Task was interrupted, marking failed");
        tasks.mark_failed(task.id, INTERRUPTED).await?;
        report.failed.push(task.id);
    }

    for task in tasks.with_status(TaskStatus::Queued).await {
        queue.requeue(task.id, &task.audio_ref, &task.owner)?;
        report.requeued.push(task.id);
    }

    if !report.is_empty() {
        info!(
            requeued = report.requeued.len(),
            failed = report.failed.len(),
            "Reconciled leftover tasks"
        );
    }
    Ok(report)
}
