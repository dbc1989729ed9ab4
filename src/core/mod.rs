//! Core task-queue machinery.
//!
//! This module contains:
//! - TaskStore / ResultStore: append-only JSONL stores
//! - SubmissionQueue: the in-process FIFO feeding the worker
//! - Worker: the single background pipeline executor
//! - StatusApi: read-only queries for polling clients
//! - recovery: startup reconciliation of leftover tasks
//! - WorkerLock: one worker per store directory

mod jsonl;
pub mod lock;
pub mod progress;
pub mod queue;
pub mod recovery;
pub mod result_store;
pub mod status;
pub mod task_store;
pub mod worker;

// Re-export commonly used types
pub use lock::WorkerLock;
pub use progress::{ProgressPlan, StageSpan};
pub use queue::{channel, QueueEntry, QueueReceiver, SubmissionQueue};
pub use recovery::{reconcile, ReconcileReport};
pub use result_store::ResultStore;
pub use status::{StatusApi, TaskSnapshot};
pub use task_store::TaskStore;
pub use worker::{GeneratorCell, SpeechCell, Worker, WorkerHandle};
