//! Domain types for the transcription pipeline.
//!
//! This module contains the core data structures:
//! - Task: one submitted recording and its processing state
//! - TaskEvent: immutable records of task state changes
//! - Transcript: the structured document a completed task produces

pub mod events;
pub mod task;
pub mod transcript;

// Re-export commonly used types
pub use events::{TaskEvent, TaskEventKind};
pub use task::{Task, TaskStatus};
pub use transcript::{file_name_of, MetadataField, MetadataMap, ParticipantMetadata, Transcript, UNKNOWN};
