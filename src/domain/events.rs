//! Task events for the append-only task log.
//!
//! Every change to a task is recorded as one event. The current state of
//! a task is rebuilt by replaying its events in order.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single line of the task log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The task this event belongs to
    pub task_id: Uuid,

    /// What happened
    #[serde(flatten)]
    pub kind: TaskEventKind,
}

/// Types of task events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEventKind {
    /// Task created and placed in the queue
    Enqueued {
        owner: String,
        source_name: String,
        audio_ref: PathBuf,
    },

    /// Worker picked the task up
    Started,

    /// Progress checkpoint inside a stage
    Progress { progress: u8, message: String },

    /// Result persisted and task finished
    Completed { result_id: Uuid },

    /// Task failed; terminal
    Failed { error: String },
}

impl TaskEvent {
    /// Create a new event with the current timestamp
    pub fn new(task_id: Uuid, kind: TaskEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            task_id,
            kind,
        }
    }

    /// Progress value carried by this event, if any
    pub fn progress(&self) -> Option<u8> {
        match &self.kind {
            TaskEventKind::Progress { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_line_format() {
        let id = Uuid::new_v4();
        let event = TaskEvent::new(
            id,
            TaskEventKind::Progress {
                progress: 40,
                message: "formatting part 1/5".to_string(),
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "progress");
        assert_eq!(json["progress"], 40);
        assert_eq!(json["task_id"], id.to_string());

        let parsed: TaskEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.progress(), Some(40));
    }

    #[test]
    fn test_unit_variant_line() {
        let event = TaskEvent::new(Uuid::nil(), TaskEventKind::Started);
        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains(r#""event":"started""#));
        assert_eq!(event.progress(), None);
    }
}
