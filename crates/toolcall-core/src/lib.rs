//! # toolcall-core
//!
//! Provider-agnostic tool-call orchestration for LLM conversations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Orchestrator                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────┐  │
//! │  │ LlmProvider │──│  Extractor  │──│   Dialect   │──│  Tool   │  │
//! │  │ (Strategy)  │  │ (per wire)  │  │   Buffer    │  │Registry │  │
//! │  └─────────────┘  └─────────────┘  └──────┬──────┘  └─────────┘  │
//! │                                           │                      │
//! │                                    ┌──────┴──────┐               │
//! │                                    │   Decoder   │               │
//! │                                    │ JSON/YAML/  │               │
//! │                                    │    XML      │               │
//! │                                    └─────────────┘               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait hides the transport; the `Extractor` trait hides
//! the provider's output shape. Everything past the extractor sees the same
//! ordered list of [`Segment`]s whichever model produced them.

pub mod config;
pub mod decode;
pub mod dialect;
pub mod error;
pub mod extract;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod tool;

pub use config::{CombineMode, OrchestratorConfig};
pub use decode::{DecodeError, DecodedCall, PayloadFormat};
pub use dialect::{CallDialect, DialectBuffer, DialectMode};
pub use error::{AgentError, Result};
pub use extract::{Extractor, MalformedCall, Segment, StreamExtractor, TextExtractor};
pub use message::{Conversation, Message, Role, ToolInvocation};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, StopReason, TurnEvent, TurnOutcome, TurnPhase,
};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use tool::{Tool, ToolCall, ToolOutcome, ToolRegistry, ToolResult, ToolSchema};
