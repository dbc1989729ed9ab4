//! Scripted collaborators for tests and dry runs.
//!
//! Both types record every call in a shared log so a test can inspect
//! what the worker asked for after handing the collaborator over.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{ChatMessage, Segment, SpeechToText, TextGenerator, TranscribeOptions};

/// Shared, clonable record of calls made to a scripted collaborator
#[derive(Debug, Clone, Default)]
pub struct CallLog<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> CallLog<T> {
    fn push(&self, item: T) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(item);
        }
    }

    /// Snapshot of all calls so far
    pub fn calls(&self) -> Vec<T> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Speech engine that replays queued responses, then a default transcript
#[derive(Debug, Clone)]
pub struct ScriptedSpeech {
    responses: VecDeque<Result<Vec<Segment>, String>>,
    default_segments: Vec<Segment>,
    log: CallLog<PathBuf>,
}

impl ScriptedSpeech {
    /// Every call returns `segments`
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            responses: VecDeque::new(),
            default_segments: segments,
            log: CallLog::default(),
        }
    }

    /// Every call returns one segment per string
    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| Segment::new(i as f64, *t))
                .collect(),
        )
    }

    /// Next unanswered call fails with `error`
    pub fn then_fail(mut self, error: &str) -> Self {
        self.responses.push_back(Err(error.to_string()));
        self
    }

    /// Next unanswered call returns `segments`
    pub fn then_return(mut self, segments: Vec<Segment>) -> Self {
        self.responses.push_back(Ok(segments));
        self
    }

    /// Audio paths passed to `transcribe`, in call order
    pub fn log(&self) -> CallLog<PathBuf> {
        self.log.clone()
    }
}

#[async_trait]
impl SpeechToText for ScriptedSpeech {
    fn name(&self) -> &str {
        "scripted-speech"
    }

    async fn transcribe(&mut self, audio: &Path, _options: &TranscribeOptions) -> Result<Vec<Segment>> {
        self.log.push(audio.to_path_buf());
        match self.responses.pop_front() {
            Some(Ok(segments)) => Ok(segments),
            Some(Err(error)) => anyhow::bail!("{}", error),
            None => Ok(self.default_segments.clone()),
        }
    }
}

type CompletionFn = Box<dyn FnMut(&str) -> Result<String> + Send>;

/// Text generator driven by closures
pub struct ScriptedGenerator {
    completion: CompletionFn,
    chat_reply: Result<String, String>,
    delay: Option<Duration>,
    prompts: CallLog<String>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// Completions answer "Speaker: part N"; chat answers "{}"
    pub fn new() -> Self {
        let mut counter = 0usize;
        Self {
            completion: Box::new(move |_| {
                counter += 1;
                Ok(format!("  Speaker: part {}  ", counter))
            }),
            chat_reply: Ok("{}".to_string()),
            delay: None,
            prompts: CallLog::default(),
        }
    }

    /// Custom completion behaviour
    pub fn with_completion(mut self, f: impl FnMut(&str) -> Result<String> + Send + 'static) -> Self {
        self.completion = Box::new(f);
        self
    }

    /// Completion number `n` (1-based) fails, the rest use the default answer
    pub fn failing_completion_at(self, n: usize) -> Self {
        let mut counter = 0usize;
        self.with_completion(move |_| {
            counter += 1;
            if counter == n {
                anyhow::bail!("generation failed on call {}", counter)
            }
            Ok(format!("Speaker: part {}", counter))
        })
    }

    pub fn with_chat_reply(mut self, reply: &str) -> Self {
        self.chat_reply = Ok(reply.to_string());
        self
    }

    pub fn with_chat_error(mut self, error: &str) -> Self {
        self.chat_reply = Err(error.to_string());
        self
    }

    /// Sleep before answering, so pollers can observe intermediate state
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts (completion prompts and the last chat message) in call order
    pub fn log(&self) -> CallLog<String> {
        self.prompts.clone()
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted-generator"
    }

    async fn complete(&mut self, prompt: &str, _max_tokens: u32, _stop: &[&str]) -> Result<String> {
        self.prompts.push(prompt.to_string());
        pause(self.delay).await;
        (self.completion)(prompt)
    }

    async fn chat_complete(
        &mut self,
        messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String> {
        if let Some(last) = messages.last() {
            self.prompts.push(last.content.clone());
        }
        pause(self.delay).await;
        self.chat_reply.clone().map_err(|e| anyhow::anyhow!(e))
    }
}
