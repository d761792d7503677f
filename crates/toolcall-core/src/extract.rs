//! Output Normalizer
//!
//! Every provider hands back output in its own wire shape. An [`Extractor`]
//! turns one of those shapes into an ordered list of [`Segment`]s: plain
//! content interleaved with the tool calls found in it.
//!
//! Text-only output goes through a [`DialectBuffer`]. Providers that return
//! calls as structured fields implement the trait themselves (see the
//! `toolcall-runtime` crate) and use [`TextExtractor`] for their text fields.

use serde::{Deserialize, Serialize};

use crate::decode::PayloadFormat;
use crate::dialect::{CallDialect, DialectBuffer, DialectMode};
use crate::error::Result;
use crate::provider::Completion;
use crate::tool::ToolCall;

/// One ordered unit of normalized output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Segment {
    /// Displayable text
    Content(String),

    /// A detected call
    ToolCall(ToolCall),

    /// A complete call block that could not be decoded (end of turn only)
    Malformed(MalformedCall),
}

impl Segment {
    /// Concatenate the content segments, skipping calls
    pub fn join_content(segments: &[Segment]) -> String {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Content(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether this segment asks for a tool to run
    pub fn is_call(&self) -> bool {
        !matches!(self, Segment::Content(_))
    }
}

/// A tag block whose payload never decoded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedCall {
    pub dialect: CallDialect,

    /// The block as it appeared, tags included
    pub raw: String,

    /// Decoder error
    pub reason: String,
}

/// Strategy trait for provider output shapes
///
/// One implementation per provider wire shape. The orchestrator works
/// exclusively through this interface.
pub trait Extractor: Send + Sync {
    /// Provider identifier (e.g. "openai", "text")
    fn provider(&self) -> &str;

    /// Normalize a complete (non-streaming) response
    fn normalize(&self, completion: &Completion) -> Result<Vec<Segment>>;

    /// Streaming extractor for a single turn
    fn stream(&self) -> StreamExtractor;
}

/// Extractor for providers that only ever return free text
#[derive(Clone, Copy, Debug, Default)]
pub struct TextExtractor {
    dialect: DialectMode,
    format: PayloadFormat,
}

impl TextExtractor {
    pub fn new(dialect: DialectMode, format: PayloadFormat) -> Self {
        Self { dialect, format }
    }

    pub fn dialect(&self) -> DialectMode {
        self.dialect
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Run a whole text through one buffer pass, in source order.
    pub fn normalize_text(&self, text: &str) -> Vec<Segment> {
        let mut buffer = DialectBuffer::new(self.dialect, self.format);
        buffer.push(text);
        buffer.finish()
    }

    pub fn stream(&self) -> StreamExtractor {
        StreamExtractor::new(self.dialect, self.format)
    }
}

impl Extractor for TextExtractor {
    fn provider(&self) -> &str {
        "text"
    }

    fn normalize(&self, completion: &Completion) -> Result<Vec<Segment>> {
        Ok(self.normalize_text(&completion.content))
    }

    fn stream(&self) -> StreamExtractor {
        TextExtractor::stream(self)
    }
}

/// Token-by-token wrapper around a [`DialectBuffer`]
///
/// Each push yields what became newly visible plus every call that closed,
/// even one sitting behind a held block; nothing is emitted twice.
#[derive(Debug)]
pub struct StreamExtractor {
    buffer: DialectBuffer,
}

impl StreamExtractor {
    pub fn new(dialect: DialectMode, format: PayloadFormat) -> Self {
        Self {
            buffer: DialectBuffer::new(dialect, format),
        }
    }

    /// Feed one token
    pub fn push_token(&mut self, token: &str) -> Vec<Segment> {
        self.buffer.push(token);
        self.buffer.drain_streaming()
    }

    /// Flush at stream end, catching a call that closed on the last token
    pub fn finalize(&mut self) -> Vec<Segment> {
        self.buffer.push("");
        self.buffer.finish()
    }

    /// Everything shown so far
    pub fn visible_content(&self) -> &str {
        self.buffer.visible_content()
    }
}
