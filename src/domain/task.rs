//! Task state and reconstruction from events.
//!
//! A Task is one submitted recording moving through the pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{TaskEvent, TaskEventKind};
use crate::error::StoreError;

/// Message shown while a task waits for the worker
pub const MSG_QUEUED: &str = "waiting in queue";
/// Message set when the worker picks a task up
pub const MSG_STARTED: &str = "processing started";
/// Message set on successful completion
pub const MSG_DONE: &str = "done";
/// Message set when a task fails
pub const MSG_FAILED: &str = "processing failed";

/// One submitted recording and its processing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, the only way to address a task
    pub id: Uuid,

    /// Submitting user; scopes visibility
    pub owner: String,

    /// Original filename, informational only
    pub source_name: String,

    /// Saved input audio
    pub audio_ref: PathBuf,

    pub status: TaskStatus,

    /// 0-100, non-decreasing while processing
    pub progress: u8,

    /// Current activity
    pub message: String,

    /// Set only when failed
    pub error: Option<String>,

    /// Set only when completed
    pub result_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a task from its `Enqueued` event
    pub fn from_enqueued(event: &TaskEvent) -> Option<Self> {
        match &event.kind {
            TaskEventKind::Enqueued {
                owner,
                source_name,
                audio_ref,
            } => Some(Self {
                id: event.task_id,
                owner: owner.clone(),
                source_name: source_name.clone(),
                audio_ref: audio_ref.clone(),
                status: TaskStatus::Queued,
                progress: 0,
                message: MSG_QUEUED.to_string(),
                error: None,
                result_id: None,
                created_at: event.timestamp,
                updated_at: event.timestamp,
            }),
            _ => None,
        }
    }

    /// Check that `event` is a legal next step for this task
    pub fn validate(&self, event: &TaskEvent) -> Result<(), StoreError> {
        let next = match &event.kind {
            TaskEventKind::Enqueued { .. } => return Err(StoreError::TaskExists(self.id)),
            TaskEventKind::Started => TaskStatus::Processing,
            TaskEventKind::Progress { progress, .. } => {
                if self.status != TaskStatus::Processing {
                    return Err(self.transition_error(TaskStatus::Processing));
                }
                if *progress < self.progress || *progress > 100 {
                    return Err(StoreError::ProgressRegression {
                        id: self.id,
                        from: self.progress,
                        to: *progress,
                    });
                }
                return Ok(());
            }
            TaskEventKind::Completed { .. } => TaskStatus::Completed,
            TaskEventKind::Failed { .. } => TaskStatus::Failed,
        };

        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(self.transition_error(next))
        }
    }

    /// Validate and apply a single event
    pub fn apply(&mut self, event: &TaskEvent) -> Result<(), StoreError> {
        self.validate(event)?;

        match &event.kind {
            TaskEventKind::Enqueued { .. } => {}
            TaskEventKind::Started => {
                self.status = TaskStatus::Processing;
                self.progress = 0;
                self.message = MSG_STARTED.to_string();
            }
            TaskEventKind::Progress { progress, message } => {
                self.progress = *progress;
                self.message = message.clone();
            }
            TaskEventKind::Completed { result_id } => {
                self.status = TaskStatus::Completed;
                self.progress = 100;
                self.message = MSG_DONE.to_string();
                self.result_id = Some(*result_id);
            }
            TaskEventKind::Failed { error } => {
                self.status = TaskStatus::Failed;
                self.progress = 0;
                self.message = MSG_FAILED.to_string();
                self.error = Some(error.clone());
            }
        }
        self.updated_at = event.timestamp;

        Ok(())
    }

    /// Queued or processing
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    fn transition_error(&self, to: TaskStatus) -> StoreError {
        StoreError::InvalidTransition {
            id: self.id,
            from: self.status,
            to,
        }
    }
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Status only moves forward: `queued → processing → {completed|failed}`
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
