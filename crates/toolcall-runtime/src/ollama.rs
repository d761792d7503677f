//! Ollama chat shape
//!
//! `message.content` goes through the dialect pass, then
//! `message.tool_calls` follow. Ollama sends no call ids and already
//! decodes `arguments` into an object.

use serde::Deserialize;
use serde_json::Value;
use toolcall_core::{Completion, Extractor, Result, Segment, StreamExtractor, TextExtractor};

use crate::{native_segment, unexpected_shape};

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Extractor for local Ollama chat responses
#[derive(Clone, Copy, Debug, Default)]
pub struct OllamaExtractor {
    text: TextExtractor,
}

impl OllamaExtractor {
    pub fn new(text: TextExtractor) -> Self {
        Self { text }
    }
}

impl Extractor for OllamaExtractor {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn normalize(&self, completion: &Completion) -> Result<Vec<Segment>> {
        let Some(raw) = &completion.raw else {
            return Ok(self.text.normalize_text(&completion.content));
        };

        let response = ChatResponse::deserialize(raw).map_err(|e| unexpected_shape("Ollama", &e))?;

        let mut segments = self.text.normalize_text(&response.message.content);
        segments.extend(
            response
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| native_segment(None, call.function.name, call.function.arguments)),
        );

        Ok(segments)
    }

    fn stream(&self) -> StreamExtractor {
        self.text.stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolcall_core::DialectMode;

    #[test]
    fn test_structured_calls() {
        let raw = json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "get_weather", "arguments": {"city": "Oslo"}}}
                ]
            },
            "done": true
        });

        let segments = OllamaExtractor::default()
            .normalize(&Completion::raw(raw))
            .unwrap();

        assert_eq!(segments.len(), 1);
        let Segment::ToolCall(call) = &segments[0] else {
            panic!("expected a call");
        };
        assert_eq!(call.id, None);
        assert_eq!(call.arguments["city"], "Oslo");
    }

    #[test]
    fn test_text_calls_from_local_model() {
        let raw = json!({
            "message": {
                "role": "assistant",
                "content": "Sure. <tool_use>{\"name\": \"ls\", \"input\": {\"path\": \"/tmp\"}}</tool_use>"
            }
        });

        let extractor = OllamaExtractor::new(TextExtractor::new(DialectMode::ToolUse, Default::default()));
        let segments = extractor.normalize(&Completion::raw(raw)).unwrap();

        assert_eq!(segments[0], Segment::Content("Sure. ".into()));
        let Segment::ToolCall(call) = &segments[1] else {
            panic!("expected a call");
        };
        assert_eq!(call.name, "ls");
        assert_eq!(call.arguments["path"], "/tmp");
    }
}
