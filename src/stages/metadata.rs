//! Participant metadata extraction.
//!
//! A single chat call over the start of the formatted dialogue. The
//! result is best-effort: anything the model gets wrong becomes an empty
//! map and the task carries on.

use serde_json::Value;
use tracing::{info, warn};

use super::StageContext;
use crate::adapters::{ChatMessage, Lazy, TextGenerator};
use crate::domain::{MetadataField, MetadataMap};
use crate::error::{PipelineError, Result};

const TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = "\
You extract participant details from research interview transcripts. \
Answer with a single JSON object and nothing else.";

fn user_prompt(excerpt: &str) -> String {
    format!(
        "From the interview excerpt below, find the participant's code, name, age \
         and education. Reply with a JSON object using exactly the keys \
         \"code\", \"name\", \"age\" and \"education\". Leave out any key you \
         cannot find.\n\n{}",
        excerpt
    )
}

/// Remove a surrounding ```json / ``` fence, if any
pub fn strip_fences(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Interpret model output as participant metadata
pub fn parse_metadata(output: &str) -> Result<MetadataMap> {
    let body = strip_fences(output);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::Parse(format!("not JSON: {}", e)))?;
    let Value::Object(object) = value else {
        return Err(PipelineError::Parse("expected a JSON object".to_string()));
    };

    let mut map = MetadataMap::new();
    for field in MetadataField::ALL {
        let text = match object.get(field.key()) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            map.insert(field, text);
        }
    }

    if map.is_empty() {
        return Err(PipelineError::Parse("no known metadata keys".to_string()));
    }
    Ok(map)
}

fn prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn ask<G: TextGenerator>(
    engine: &mut Lazy<G>,
    formatted: &str,
    ctx: &StageContext<'_>,
) -> Result<MetadataMap> {
    let engine = engine.get().map_err(PipelineError::engine)?;
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt(prefix(formatted, ctx.settings.metadata_prefix_chars))),
    ];
    let output = engine
        .chat_complete(&messages, ctx.settings.metadata_max_tokens, TEMPERATURE)
        .await
        .map_err(PipelineError::engine)?;
    parse_metadata(&output)
}

/// Extract metadata; failures are logged and yield an empty map
pub async fn extract_metadata<G: TextGenerator>(
    engine: &mut Lazy<G>,
    formatted: &str,
    ctx: &StageContext<'_>,
) -> Result<MetadataMap> {
    let span = ctx.plan().metadata;
    ctx.report(span.start, "extracting metadata").await?;

    let map = match ask(engine, formatted, ctx).await {
        Ok(map) => {
            info!(fields = map.len(), "Metadata extracted");
            map
        }
        Err(e @ (PipelineError::Parse(_) | PipelineError::Engine(_))) => {
            warn!(error = %e, "Metadata extraction failed, using defaults");
            MetadataMap::new()
        }
        Err(e) => return Err(e),
    };

    ctx.report(span.end, "metadata extracted").await?;
    Ok(map)
}
