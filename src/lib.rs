//! scribe - queued interview transcription pipeline
//!
//! Turns uploaded interview recordings into speaker-formatted transcripts
//! with participant metadata, one task at a time, reporting progress as
//! it goes.
//!
//! # Architecture
//!
//! Task state is event-sourced:
//! - Every task change is appended to a JSONL log
//! - Current state is derived by replaying the log
//! - A single background worker drains an in-process FIFO queue
//!
//! # Modules
//!
//! - `adapters`: Speech-to-text and text-generation collaborators
//! - `core`: Stores, queue, worker, status queries, reconciliation
//! - `stages`: Transcription, chunked reformatting, metadata extraction
//! - `domain`: Data structures (Task, TaskEvent, Transcript)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Transcribe recordings and wait for the results
//! scribe run interview-01.webm interview-02.webm --owner alice
//!
//! # Check a task
//! scribe status <task-id>
//!
//! # Print a finished transcript
//! scribe show <result-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod stages;

// Re-export main types at crate root for convenience
pub use core::{
    ResultStore, StatusApi, SubmissionQueue, TaskSnapshot, TaskStore, Worker, WorkerHandle,
    WorkerLock,
};
pub use domain::{ParticipantMetadata, Task, TaskStatus, Transcript};
pub use error::{PipelineError, StoreError};
