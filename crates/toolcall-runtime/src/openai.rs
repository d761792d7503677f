//! OpenAI chat-completions shape
//!
//! Maps `choices[0].message` to segments: its `content` goes through the
//! dialect pass, then each entry of `tool_calls` becomes a native call.

use serde::Deserialize;
use serde_json::Value;
use toolcall_core::{
    AgentError, Completion, Extractor, Result, Segment, StreamExtractor, TextExtractor,
};

use crate::{native_segment, unexpected_shape};

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: Option<String>,
    /// A JSON-encoded string on the wire; some servers send an object
    #[serde(default)]
    arguments: Option<Value>,
}

/// Extractor for OpenAI-compatible chat completions
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiExtractor {
    text: TextExtractor,
}

impl OpenAiExtractor {
    pub fn new(text: TextExtractor) -> Self {
        Self { text }
    }
}

impl Extractor for OpenAiExtractor {
    fn provider(&self) -> &str {
        "openai"
    }

    fn normalize(&self, completion: &Completion) -> Result<Vec<Segment>> {
        let Some(raw) = &completion.raw else {
            return Ok(self.text.normalize_text(&completion.content));
        };

        let response = ChatResponse::deserialize(raw).map_err(|e| unexpected_shape("OpenAI", &e))?;
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("OpenAI response has no choices".into()))?
            .message;

        let mut segments = self
            .text
            .normalize_text(message.content.as_deref().unwrap_or_default());

        let calls = message.tool_calls.unwrap_or_default();
        tracing::debug!(calls = calls.len(), "Mapping OpenAI tool calls");
        segments.extend(
            calls
                .into_iter()
                .map(|call| native_segment(call.id, call.function.name, call.function.arguments)),
        );

        Ok(segments)
    }

    fn stream(&self) -> StreamExtractor {
        self.text.stream()
    }
}
