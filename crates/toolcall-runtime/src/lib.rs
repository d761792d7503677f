//! # toolcall-runtime
//!
//! Extractors for concrete provider wire shapes.
//!
//! ## Providers
//!
//! - **OpenAI**: chat-completions `choices[0].message.tool_calls`
//! - **Anthropic**: messages API `content` blocks (`text` / `tool_use`)
//! - **Ollama**: chat `message.tool_calls`
//! - **Text**: any model prompted to embed calls in its text
//!
//! ## Usage
//!
//! ```rust,ignore
//! use toolcall_runtime::{extractor_for, ProviderKind};
//!
//! let kind: ProviderKind = "openai".parse()?;
//! let orchestrator = OrchestratorBuilder::new()
//!     .provider(provider)
//!     .extractor(extractor_for(kind, config.dialect, config.format))
//!     .build()?;
//! ```

pub mod anthropic;
pub mod ollama;
pub mod openai;

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolcall_core::decode::arguments_from_value;
use toolcall_core::{
    AgentError, CallDialect, DialectMode, Extractor, MalformedCall, PayloadFormat, Segment,
    TextExtractor, ToolCall,
};

pub use anthropic::AnthropicExtractor;
pub use ollama::OllamaExtractor;
pub use openai::OpenAiExtractor;

// Re-export core types for convenience
pub use toolcall_core::{
    Orchestrator, OrchestratorBuilder, OrchestratorConfig, Result, StopReason, TurnOutcome,
};

/// Known provider output shapes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Ollama,
    Text,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Text => write!(f, "text"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            "text" => Ok(ProviderKind::Text),
            other => Err(AgentError::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// Pick the extractor for a provider. Text fields of every provider are
/// scanned with the given dialect and payload format.
pub fn extractor_for(
    kind: ProviderKind,
    dialect: DialectMode,
    format: PayloadFormat,
) -> Arc<dyn Extractor> {
    let text = TextExtractor::new(dialect, format);
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiExtractor::new(text)),
        ProviderKind::Anthropic => Arc::new(AnthropicExtractor::new(text)),
        ProviderKind::Ollama => Arc::new(OllamaExtractor::new(text)),
        ProviderKind::Text => Arc::new(text),
    }
}

/// Map a structured call field to a segment.
///
/// A missing name is kept empty so the orchestrator reports it; arguments
/// of an impossible type become a malformed segment.
fn native_segment(id: Option<String>, name: Option<String>, arguments: Option<Value>) -> Segment {
    let raw = arguments.as_ref().map(Value::to_string).unwrap_or_default();
    match arguments_from_value(arguments) {
        Ok(arguments) => Segment::ToolCall(ToolCall::native(id, name.unwrap_or_default(), arguments)),
        Err(e) => Segment::Malformed(MalformedCall {
            dialect: CallDialect::Native,
            raw,
            reason: e.to_string(),
        }),
    }
}

fn unexpected_shape(provider: &str, err: &serde_json::Error) -> AgentError {
    AgentError::Provider(format!("unexpected {provider} response shape: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use toolcall_core::provider::{Completion, CompletionStream, GenerationOptions};
    use toolcall_core::{LlmProvider, Message, Role, Tool, ToolSchema};

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" ollama ".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert!("bedrock".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Anthropic.to_string(), "anthropic");
    }

    #[test]
    fn test_extractor_for() {
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::Ollama,
            ProviderKind::Text,
        ] {
            let extractor = extractor_for(kind, DialectMode::Auto, PayloadFormat::Auto);
            assert_eq!(extractor.provider(), kind.to_string());
        }
    }

    #[test]
    fn test_native_segment() {
        let call = native_segment(Some("a".into()), None, Some(json!("{\"x\":1}")));
        match call {
            Segment::ToolCall(call) => {
                assert_eq!(call.name, "");
                assert_eq!(call.arguments["x"], 1);
                assert_eq!(call.dialect, CallDialect::Native);
            }
            other => panic!("expected a call, got {other:?}"),
        }

        assert!(matches!(
            native_segment(None, Some("f".into()), Some(json!(42))),
            Segment::Malformed(_)
        ));
    }

    /// Replies with raw OpenAI bodies
    struct RawProvider {
        bodies: Vec<Value>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for RawProvider {
        fn name(&self) -> &str {
            "raw"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<Completion> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Completion::raw(self.bodies[n].clone()))
        }

        async fn complete_stream(
            &self,
            _messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<CompletionStream> {
            Err(AgentError::ProviderUnavailable("no streaming".into()))
        }
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo the arguments".into(),
                parameters: vec![],
                has_side_effects: false,
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<Value> {
            Ok(Value::Object(call.arguments.clone()))
        }
    }

    #[tokio::test]
    async fn test_openai_turn_end_to_end() {
        let provider = RawProvider {
            bodies: vec![
                json!({"choices": [{"message": {
                    "content": null,
                    "tool_calls": [{"id": "call_1", "type": "function",
                        "function": {"name": "echo", "arguments": "{\"word\":\"hi\"}"}}]
                }}]}),
                json!({"choices": [{"message": {"content": "Echoed."}}]}),
            ],
            calls: std::sync::atomic::AtomicUsize::new(0),
        };

        let mut orchestrator = OrchestratorBuilder::new()
            .provider(Arc::new(provider))
            .extractor(extractor_for(ProviderKind::OpenAi, DialectMode::Auto, PayloadFormat::Auto))
            .tool(Echo)
            .build()
            .unwrap();

        let outcome = orchestrator.run("Say hi").await.unwrap();
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.content, "Echoed.");

        let tool_msg = &orchestrator.history()[1];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.content, r#"{"word":"hi"}"#);
        assert_eq!(tool_msg.tool_call_id(), Some("call_1"));
    }
}
