//! Adapter interfaces for the inference collaborators.
//!
//! The worker talks to a speech-to-text engine and a text-generation
//! engine through the traits below. Both engines are stateful and not
//! reentrant, so every call takes `&mut self`: whoever owns the engine
//! is the only one who can drive it.

pub mod lazy;
pub mod llama;
pub mod mock;
pub mod whisper;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use lazy::Lazy;
pub use llama::LlamaServer;
pub use mock::{ScriptedGenerator, ScriptedSpeech};
pub use whisper::WhisperCli;

/// One piece of recognized speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Offset into the recording, in seconds
    pub start_secs: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start_secs: f64, text: impl Into<String>) -> Self {
        Self {
            start_secs,
            text: text.into(),
        }
    }
}

/// Per-call options for the speech engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscribeOptions {
    /// Language hint (e.g. "id", "en"); `None` lets the engine detect it
    pub language: Option<String>,
    /// Skip silent regions before decoding
    pub vad: bool,
}

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Speech-to-text engine
#[async_trait]
pub trait SpeechToText: Send {
    /// Human-readable engine name
    fn name(&self) -> &str;

    /// Recognize speech in an audio file, returning segments in emission order
    async fn transcribe(&mut self, audio: &Path, options: &TranscribeOptions) -> Result<Vec<Segment>>;
}

/// Text-generation engine
#[async_trait]
pub trait TextGenerator: Send {
    /// Human-readable engine name
    fn name(&self) -> &str;

    /// Raw completion; generation stops at any of `stop`
    async fn complete(&mut self, prompt: &str, max_tokens: u32, stop: &[&str]) -> Result<String>;

    /// Chat-style completion
    async fn chat_complete(
        &mut self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;
}

#[async_trait]
impl<T: SpeechToText + ?Sized> SpeechToText for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn transcribe(&mut self, audio: &Path, options: &TranscribeOptions) -> Result<Vec<Segment>> {
        (**self).transcribe(audio, options).await
    }
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&mut self, prompt: &str, max_tokens: u32, stop: &[&str]) -> Result<String> {
        (**self).complete(prompt, max_tokens, stop).await
    }

    async fn chat_complete(
        &mut self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        (**self).chat_complete(messages, max_tokens, temperature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_wire_format() {
        let json = serde_json::to_value(ChatMessage::system("be terse")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "system", "content": "be terse"}));
    }
}
