//! llama.cpp server client for text generation.
//!
//! Endpoints:
//! - POST /completion (raw prompt with stop markers)
//! - POST /v1/chat/completions (OpenAI-compatible chat)

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, TextGenerator};
use crate::config::LlamaSettings;

/// Sampling temperature for raw completions
const COMPLETION_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    stop: &'a [&'a str],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

impl ChatResponse {
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Chat response contained no choices")
    }
}

/// HTTP client for a running llama.cpp server
pub struct LlamaServer {
    base_url: String,
    client: reqwest::Client,
}

impl LlamaServer {
    /// Create a new client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_settings(settings: &LlamaSettings) -> Result<Self> {
        Self::new(&settings.base_url, Duration::from_secs(settings.timeout_seconds))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = self.endpoint(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach llama server at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("llama server error ({}): {}", status, text);
        }

        response
            .json::<R>()
            .await
            .with_context(|| format!("Unexpected response from {}", url))
    }
}

#[async_trait]
impl TextGenerator for LlamaServer {
    fn name(&self) -> &str {
        "llama.cpp"
    }

    async fn complete(&mut self, prompt: &str, max_tokens: u32, stop: &[&str]) -> Result<String> {
        let request = CompletionRequest {
            prompt,
            n_predict: max_tokens,
            stop,
            temperature: COMPLETION_TEMPERATURE,
        };
        let response: CompletionResponse = self.post("/completion", &request).await?;
        Ok(response.content)
    }

    async fn chat_complete(
        &mut self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = ChatRequest {
            messages,
            max_tokens,
            temperature,
        };
        let response: ChatResponse = self.post("/v1/chat/completions", &request).await?;
        response.into_text()
    }
}
