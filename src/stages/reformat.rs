//! Chunked dialogue reconstruction.
//!
//! The raw transcript is cut into fixed-size character windows and each
//! window is rewritten independently as speaker-labelled dialogue. No
//! context crosses a chunk boundary, so a sentence split across two
//! chunks is formatted as two fragments.

use tracing::{debug, info};

use super::StageContext;
use crate::adapters::{Lazy, TextGenerator};
use crate::error::{PipelineError, Result};

/// Section labels of the prompt; generation stops if the model starts a new one
pub const STOP_MARKERS: [&str; 2] = ["### Transcript:", "### Dialogue:"];

const SEPARATOR: &str = "\n\n";

const INSTRUCTIONS: &str = "\
Rewrite the interview transcript below as a dialogue between the Interviewer \
and the Participant. Put each turn on its own line, prefixed with the speaker \
label followed by a colon. Keep the original language and wording; fix only \
punctuation and obvious recognition errors. Do not summarize or add content.";

/// Split `text` into chunks of at most `chunk_chars` characters
pub fn split_chunks(text: &str, chunk_chars: usize) -> Vec<&str> {
    let size = chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }

    chunks
}

/// Prompt for one chunk
pub fn build_prompt(chunk: &str) -> String {
    format!(
        "{}\n\n{}\n{}\n\n{}\n",
        INSTRUCTIONS, STOP_MARKERS[0], chunk, STOP_MARKERS[1]
    )
}

/// Rewrite `raw` chunk by chunk and join the results with blank lines
pub async fn reformat<G: TextGenerator>(
    engine: &mut Lazy<G>,
    raw: &str,
    ctx: &StageContext<'_>,
) -> Result<String> {
    let span = ctx.plan().reformatting;
    let chunks = split_chunks(raw, ctx.settings.chunk_chars);
    let total = chunks.len();
    let engine = engine.get().map_err(PipelineError::engine)?;

    let mut parts = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let message = format!("formatting part {}/{}", i + 1, total);
        ctx.report(span.interpolate(i + 1, total), &message).await?;

        debug!(part = i + 1, total, chars = chunk.chars().count(), "Formatting chunk");
        let output = engine
            .complete(&build_prompt(chunk), ctx.settings.chunk_max_tokens, &STOP_MARKERS)
            .await
            .map_err(|e| {
                PipelineError::engine(e.context(format!("formatting part {}/{} failed", i + 1, total)))
            })?;
        parts.push(output.trim().to_string());
    }

    info!(chunks = total, "Formatting finished");
    ctx.report(span.end, "formatting finished").await?;
    Ok(parts.join(SEPARATOR))
}
