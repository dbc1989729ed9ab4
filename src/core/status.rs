//! Read-only status queries for polling clients.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::result_store::ResultStore;
use super::task_store::TaskStore;
use crate::domain::{Task, TaskStatus, Transcript};

/// A task as seen by a client, with its result embedded once completed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub owner: String,
    pub source_name: String,
    pub audio_ref: PathBuf,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub result_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Present when completed and the transcript has not been deleted
    pub result: Option<Transcript>,
}

impl TaskSnapshot {
    fn new(task: Task, result: Option<Transcript>) -> Self {
        Self {
            id: task.id,
            owner: task.owner,
            source_name: task.source_name,
            audio_ref: task.audio_ref,
            status: task.status,
            progress: task.progress,
            message: task.message,
            error: task.error,
            result_id: task.result_id,
            created_at: task.created_at,
            updated_at: task.updated_at,
            result,
        }
    }
}

/// Query surface over the task and result stores
#[derive(Debug, Clone)]
pub struct StatusApi {
    tasks: Arc<TaskStore>,
    results: Arc<ResultStore>,
}

impl StatusApi {
    pub fn new(tasks: Arc<TaskStore>, results: Arc<ResultStore>) -> Self {
        Self { tasks, results }
    }

    async fn snapshot(&self, task: Task) -> TaskSnapshot {
        let result = match task.result_id {
            Some(result_id) => self.results.get(result_id).await,
            None => None,
        };
        TaskSnapshot::new(task, result)
    }

    /// Current state of any task
    pub async fn get_status(&self, task_id: Uuid) -> Option<TaskSnapshot> {
        let task = self.tasks.get(task_id).await?;
        Some(self.snapshot(task).await)
    }

    /// Like [`get_status`](Self::get_status), hidden from anyone but the owner
    pub async fn get_owned_status(&self, owner: &str, task_id: Uuid) -> Option<TaskSnapshot> {
        let task = self.tasks.get(task_id).await.filter(|t| t.owner == owner)?;
        Some(self.snapshot(task).await)
    }

    /// Owner's queued and processing tasks, most recent first
    pub async fn list_active(&self, owner: &str) -> Vec<TaskSnapshot> {
        self.tasks
            .find(|t| t.owner == owner && t.is_active())
            .await
            .into_iter()
            .map(|t| TaskSnapshot::new(t, None))
            .collect()
    }

    /// Owner's transcripts, most recent first
    pub async fn list_results(&self, owner: &str) -> Vec<Transcript> {
        self.results.list_by_owner(owner).await
    }

    pub async fn get_result(&self, result_id: Uuid) -> Option<Transcript> {
        self.results.get(result_id).await
    }
}
