//! Anthropic messages shape
//!
//! `content` is an ordered list of blocks. Text blocks go through the
//! dialect pass; `tool_use` blocks become native calls in place. Other
//! block types (thinking, images) are skipped.

use serde::Deserialize;
use serde_json::Value;
use toolcall_core::{Completion, Extractor, Result, Segment, StreamExtractor, TextExtractor};

use crate::{native_segment, unexpected_shape};

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Option<Value>,
    },
    #[serde(other)]
    Other,
}

/// Extractor for the Anthropic messages API
#[derive(Clone, Copy, Debug, Default)]
pub struct AnthropicExtractor {
    text: TextExtractor,
}

impl AnthropicExtractor {
    pub fn new(text: TextExtractor) -> Self {
        Self { text }
    }
}

impl Extractor for AnthropicExtractor {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn normalize(&self, completion: &Completion) -> Result<Vec<Segment>> {
        let Some(raw) = &completion.raw else {
            return Ok(self.text.normalize_text(&completion.content));
        };

        let response =
            MessagesResponse::deserialize(raw).map_err(|e| unexpected_shape("Anthropic", &e))?;

        let mut segments = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text } => segments.extend(self.text.normalize_text(&text)),
                ContentBlock::ToolUse { id, name, input } => {
                    segments.push(native_segment(id, name, input));
                }
                ContentBlock::Other => {}
            }
        }

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
    use toolcall_core::AgentError;

    #[test]
    fn test_blocks_in_order() {
        let raw = json!({
            "id": "msg_1",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Looking it up."},
                {"type": "tool_use", "id": "toolu_1", "name": "search", "input": {"q": "rust"}},
                {"type": "text", "text": "One moment."}
            ],
            "stop_reason": "tool_use"
        });

        let segments = AnthropicExtractor::default()
            .normalize(&Completion::raw(raw))
            .unwrap();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Content("Looking it up.".into()));
        let Segment::ToolCall(call) = &segments[1] else {
            panic!("expected a call");
        };
        assert_eq!(call.name, "search");
        assert_eq!(call.id.as_deref(), Some("toolu_1"));
        assert_eq!(call.arguments["q"], "rust");
        assert_eq!(segments[2], Segment::Content("One moment.".into()));
    }

    #[test]
    fn test_missing_content_is_provider_error() {
        let err = AnthropicExtractor::default()
            .normalize(&Completion::raw(json!({"type": "error"})))
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}
