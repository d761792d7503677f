//! Model Provider Seam
//!
//! The model call itself (HTTP, SSE, auth) lives outside this crate. A
//! provider collaborator implements [`LlmProvider`] and hands back either a
//! complete [`Completion`] or a stream of text chunks; the orchestrator does
//! the rest.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use toolcall_core::provider::{LlmProvider, GenerationOptions};
//!
//! let completion = provider.complete(history, &GenerationOptions::default()).await?;
//! let segments = extractor.normalize(&completion)?;
//! ```

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::message::Message;

/// Sampling settings forwarded untouched to the provider
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Model identifier, e.g. "llama3.2" or "gpt-4o"
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: 0.7,
            max_tokens: 2048,
            stop_sequences: Vec::new(),
        }
    }
}

/// One complete model response
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Provider-native response body, when the provider returns structured
    /// call fields that the extractor should map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub usage: Option<TokenUsage>,

    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// A text-only completion
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// A completion carrying the provider's raw response body
    pub fn raw(raw: serde_json::Value) -> Self {
        Self {
            raw: Some(raw),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why the model stopped generating
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// One increment of a streamed response
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text delta
    pub delta: String,

    /// Set on the last chunk
    pub done: bool,

    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    pub fn delta(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Default::default()
        }
    }
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Transport-side collaborator for model calls
///
/// Implement this trait to plug a model backend into the orchestrator.
/// Errors returned here are transport errors and are propagated as-is.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "openai", "ollama")
    fn name(&self) -> &str;

    /// Request one complete response for the history
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// Request the response as a stream of text deltas
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options() {
        let opts: GenerationOptions = serde_json::from_str(r#"{"model": "qwen2.5"}"#).unwrap();
        assert_eq!(opts.model, "qwen2.5");
        assert_eq!(opts.max_tokens, 2048);
        assert!(opts.stop_sequences.is_empty());
    }

    #[test]
    fn test_completion_constructors() {
        let text = Completion::text("hi");
        assert_eq!(text.content, "hi");
        assert!(text.raw.is_none());

        let raw = Completion::raw(serde_json::json!({"content": []}));
        assert!(raw.raw.is_some());
        assert!(raw.content.is_empty());
    }
}
