//! Durable task store.
//!
//! Follows the event-log pattern: every task change is appended to
//! `tasks.jsonl` and the current state is derived by replay. An in-memory
//! index built at open serves reads; writes validate against the index,
//! append, and only then update the index, all under one lock so each
//! record sees a serial history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::jsonl;
use crate::domain::{Task, TaskEvent, TaskEventKind, TaskStatus};
use crate::error::StoreError;

/// A task plus its position in the log
#[derive(Debug)]
struct Slot {
    /// Creation order; equal timestamps are still totally ordered
    seq: usize,
    task: Task,
}

/// JSONL-backed task store
#[derive(Debug)]
pub struct TaskStore {
    /// Path to the task log
    path: PathBuf,

    /// Current state of every task, keyed by id
    tasks: Mutex<HashMap<Uuid, Slot>>,
}

impl TaskStore {
    /// Open (or create) a store at `path`, replaying any existing log
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let events: Vec<TaskEvent> = jsonl::read_all(&path).await?;
        let tasks = Self::replay(events);

        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
        })
    }

    /// Path to the task log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild task state from events, skipping lines that break invariants
    fn replay(events: Vec<TaskEvent>) -> HashMap<Uuid, Slot> {
        let mut tasks: HashMap<Uuid, Slot> = HashMap::new();

        for event in events {
            if let Some(slot) = tasks.get_mut(&event.task_id) {
                if let Err(e) = slot.task.apply(&event) {
                    warn!(task_id = %event.task_id, error = %e, "Skipping invalid task event");
                }
            } else if let Some(task) = Task::from_enqueued(&event) {
                let seq = tasks.len();
                tasks.insert(task.id, Slot { seq, task });
            } else {
                warn!(task_id = %event.task_id, "Skipping event for unknown task");
            }
        }

        tasks
    }

    /// Create a queued task
    pub async fn create(
        &self,
        id: Uuid,
        owner: &str,
        source_name: &str,
        audio_ref: &Path,
    ) -> Result<Task, StoreError> {
        let event = TaskEvent::new(
            id,
            TaskEventKind::Enqueued {
                owner: owner.to_string(),
                source_name: source_name.to_string(),
                audio_ref: audio_ref.to_path_buf(),
            },
        );

        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&id) {
            return Err(StoreError::TaskExists(id));
        }

        jsonl::append_locked(&self.path, &event).await?;

        let task = Task::from_enqueued(&event).ok_or(StoreError::TaskNotFound(id))?;
        let seq = tasks.len();
        tasks.insert(
            id,
            Slot {
                seq,
                task: task.clone(),
            },
        );
        Ok(task)
    }

    /// Validate, persist and apply one change to an existing task
    pub async fn record(&self, id: Uuid, kind: TaskEventKind) -> Result<Task, StoreError> {
        let event = TaskEvent::new(id, kind);

        let mut tasks = self.tasks.lock().await;
        let slot = tasks.get_mut(&id).ok_or(StoreError::TaskNotFound(id))?;
        slot.task.validate(&event)?;

        jsonl::append_locked(&self.path, &event).await?;

        slot.task.apply(&event)?;
        Ok(slot.task.clone())
    }

    /// `queued → processing`
    pub async fn mark_processing(&self, id: Uuid) -> Result<Task, StoreError> {
        self.record(id, TaskEventKind::Started).await
    }

    /// Progress checkpoint; must not go backwards
    pub async fn set_progress(&self, id: Uuid, progress: u8, message: &str) -> Result<Task, StoreError> {
        self.record(
            id,
            TaskEventKind::Progress {
                progress,
                message: message.to_string(),
            },
        )
        .await
    }

    /// `processing → completed`
    pub async fn mark_completed(&self, id: Uuid, result_id: Uuid) -> Result<Task, StoreError> {
        self.record(id, TaskEventKind::Completed { result_id }).await
    }

    /// `processing → failed`
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Task, StoreError> {
        self.record(
            id,
            TaskEventKind::Failed {
                error: error.to_string(),
            },
        )
        .await
    }

    /// Get a task by id
    pub async fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.lock().await.get(&id).map(|s| s.task.clone())
    }

    /// All tasks matching `filter`, most recently created first
    pub async fn find<F>(&self, filter: F) -> Vec<Task>
    where
        F: Fn(&Task) -> bool,
    {
        let tasks = self.tasks.lock().await;
        let mut found: Vec<&Slot> = tasks.values().filter(|s| filter(&s.task)).collect();
        found.sort_by(|a, b| b.seq.cmp(&a.seq));
        found.into_iter().map(|s| s.task.clone()).collect()
    }

    /// Tasks in the given status, oldest first
    pub async fn with_status(&self, status: TaskStatus) -> Vec<Task> {
        let mut found = self.find(|t| t.status == status).await;
        found.reverse();
        found
    }

    /// The persisted history of one task, in order
    pub async fn history(&self, id: Uuid) -> Result<Vec<TaskEvent>, StoreError> {
        let _guard = self.tasks.lock().await;
        let events: Vec<TaskEvent> = jsonl::read_all(&self.path).await?;
        Ok(events.into_iter().filter(|e| e.task_id == id).collect())
    }

    /// The whole persisted log, in order
    pub async fn events(&self) -> Result<Vec<TaskEvent>, StoreError> {
        let _guard = self.tasks.lock().await;
        jsonl::read_all(&self.path).await
    }
}
