//! Pipeline stages run by the worker, in order:
//!
//! 1. `transcription`: audio to raw text
//! 2. `reformat`: raw text to speaker-formatted dialogue, chunk by chunk
//! 3. `metadata`: participant details from the formatted dialogue
//!
//! Each stage reports progress through a [`StageContext`] before it hands
//! over to the next one.

pub mod metadata;
pub mod reformat;
pub mod transcription;

use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::core::progress::ProgressPlan;
use crate::core::TaskStore;
use crate::error::Result;

pub use metadata::{extract_metadata, parse_metadata};
pub use reformat::{build_prompt, reformat, split_chunks, STOP_MARKERS};
pub use transcription::{join_segments, transcribe, validate_input};

/// Per-task handle the stages use to read settings and write progress
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    tasks: &'a TaskStore,
    task_id: Uuid,
    pub settings: &'a PipelineSettings,
}

impl<'a> StageContext<'a> {
    pub fn new(tasks: &'a TaskStore, task_id: Uuid, settings: &'a PipelineSettings) -> Self {
        Self {
            tasks,
            task_id,
            settings,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn plan(&self) -> &ProgressPlan {
        &self.settings.progress
    }

    /// Persist a progress checkpoint for the task
    pub async fn report(&self, progress: u8, message: &str) -> Result<()> {
        self.tasks.set_progress(self.task_id, progress, message).await?;
        Ok(())
    }
}
