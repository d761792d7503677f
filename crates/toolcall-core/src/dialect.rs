//! Dialect Buffer
//!
//! Model families signal an embedded call with different tag pairs. This
//! module holds the immutable tag table and the per-turn buffer that pulls
//! complete call blocks out of accumulated text.
//!
//! ```text
//!  push("Let me check. <tool_")       visible: "Let me check. "
//!  push("call>{\"name\":\"x\"")       visible: "Let me check. "
//!  push("}</tool_call> Done.")        visible: "Let me check.  Done."   -> call x
//! ```
//!
//! Scanning is plain index arithmetic over the table; nothing is shared
//! between buffers, so interleaved turns cannot disturb each other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decode::{decode, PayloadFormat};
use crate::error::AgentError;
use crate::extract::{MalformedCall, Segment};
use crate::tool::ToolCall;

/// Protocol a call was expressed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDialect {
    /// `<function_call>...</function_call>`
    FunctionCalling,
    /// `<tool_use>...</tool_use>`
    ToolUse,
    /// `<tool_call>...</tool_call>`
    Tool,
    /// Structured call fields returned by the provider
    Native,
}

impl fmt::Display for CallDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDialect::FunctionCalling => write!(f, "function_calling"),
            CallDialect::ToolUse => write!(f, "tool_use"),
            CallDialect::Tool => write!(f, "tool"),
            CallDialect::Native => write!(f, "native"),
        }
    }
}

/// Which dialects a conversation listens for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectMode {
    FunctionCalling,
    ToolUse,
    Tool,
    /// All dialects, in table order
    #[default]
    Auto,
    /// Text is never scanned for calls
    None,
}

impl DialectMode {
    /// Tag pairs active in this mode
    pub fn tags(self) -> &'static [TagPair] {
        match self {
            DialectMode::FunctionCalling => &DIALECT_TABLE[0..1],
            DialectMode::ToolUse => &DIALECT_TABLE[1..2],
            DialectMode::Tool => &DIALECT_TABLE[2..3],
            DialectMode::Auto => &DIALECT_TABLE,
            DialectMode::None => &[],
        }
    }
}

impl fmt::Display for DialectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectMode::FunctionCalling => write!(f, "function_calling"),
            DialectMode::ToolUse => write!(f, "tool_use"),
            DialectMode::Tool => write!(f, "tool"),
            DialectMode::Auto => write!(f, "auto"),
            DialectMode::None => write!(f, "none"),
        }
    }
}

impl FromStr for DialectMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "function_calling" => Ok(DialectMode::FunctionCalling),
            "tool_use" => Ok(DialectMode::ToolUse),
            "tool" => Ok(DialectMode::Tool),
            "auto" => Ok(DialectMode::Auto),
            "none" => Ok(DialectMode::None),
            other => Err(AgentError::Config(format!("unknown dialect: {other}"))),
        }
    }
}

/// Open/close markers of one dialect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagPair {
    pub dialect: CallDialect,
    pub open: &'static str,
    pub close: &'static str,
}

/// Priority order used by `auto`
pub const DIALECT_TABLE: [TagPair; 3] = [
    TagPair {
        dialect: CallDialect::FunctionCalling,
        open: "<function_call>",
        close: "</function_call>",
    },
    TagPair {
        dialect: CallDialect::ToolUse,
        open: "<tool_use>",
        close: "</tool_use>",
    },
    TagPair {
        dialect: CallDialect::Tool,
        open: "<tool_call>",
        close: "</tool_call>",
    },
];

/// A complete `open ... close` block located in the raw text
#[derive(Clone, Copy, Debug)]
struct Block {
    tag: usize,
    start: usize,
    inner_start: usize,
    inner_end: usize,
    end: usize,
}

/// A detected block not yet handed out
#[derive(Debug)]
struct Pending {
    /// Where the block sat in the current raw text
    pos: usize,
    /// Where the block sat in the text as the model produced it
    source: usize,
    segment: Segment,
}

/// Accumulates one turn of model output and extracts complete call blocks.
///
/// Detected blocks are cut out of the raw text and remembered, anchored at
/// the offset they occupied, so [`DialectBuffer::drain_segments`] can put
/// them back in order between the surrounding content. Blocks cut out next
/// to each other share an anchor; their source offset keeps them ordered.
#[derive(Debug)]
pub struct DialectBuffer {
    tags: &'static [TagPair],
    format: PayloadFormat,
    raw: String,
    emitted: usize,
    pending: Vec<Pending>,
    /// `(anchor, length)` of every block cut out so far
    removals: Vec<(usize, usize)>,
    finished: bool,
}

impl DialectBuffer {
    pub fn new(mode: DialectMode, format: PayloadFormat) -> Self {
        Self {
            tags: mode.tags(),
            format,
            raw: String::new(),
            emitted: 0,
            pending: Vec::new(),
            removals: Vec::new(),
            finished: false,
        }
    }

    /// Append a chunk and return the calls it completed, in closing order.
    pub fn push(&mut self, chunk: &str) -> Vec<ToolCall> {
        self.raw.push_str(chunk);
        self.scan(false)
    }

    /// Text that is safe to display: everything before the first open tag
    /// still in the buffer, minus a trailing partial open tag.
    pub fn visible_content(&self) -> &str {
        &self.raw[..self.visible_end()]
    }

    /// Segments between the emitted boundary and the visible end.
    pub fn drain_segments(&mut self) -> Vec<Segment> {
        let end = self.visible_end();
        let mut segments = Vec::new();
        let mut cursor = self.emitted;

        self.pending.sort_by_key(|p| (p.pos, p.source));
        let ready = self.pending.iter().take_while(|p| p.pos <= end).count();

        for Pending { pos, segment, .. } in self.pending.drain(..ready) {
            if pos > cursor {
                segments.push(Segment::Content(self.raw[cursor..pos].to_string()));
                cursor = pos;
            }
            segments.push(segment);
        }

        if end > cursor {
            segments.push(Segment::Content(self.raw[cursor..end].to_string()));
        }

        self.emitted = end;
        segments
    }

    /// Like [`drain_segments`](Self::drain_segments), but also hands out
    /// calls that closed past the visible end. The content around them stays
    /// held until it becomes visible.
    pub fn drain_streaming(&mut self) -> Vec<Segment> {
        let mut segments = self.drain_segments();
        segments.extend(self.pending.drain(..).map(|p| p.segment));
        segments
    }

    /// Final flush at the end of the turn.
    ///
    /// Complete blocks that still do not decode become `Malformed`; text
    /// after an unterminated open tag is released as plain content.
    pub fn finish(&mut self) -> Vec<Segment> {
        self.scan(true);
        self.finished = true;
        self.drain_segments()
    }

    fn visible_end(&self) -> usize {
        if self.finished {
            return self.raw.len();
        }

        let tail = &self.raw[self.emitted..];
        let end = match self.tags.iter().filter_map(|t| tail.find(t.open)).min() {
            Some(idx) => self.emitted + idx,
            None => self.raw.len() - partial_open_len(tail, self.tags),
        };

        end.max(self.emitted)
    }

    fn scan(&mut self, finishing: bool) -> Vec<ToolCall> {
        let tags = self.tags;
        let mut cursors = vec![self.emitted; tags.len()];
        let mut detected = Vec::new();

        while let Some(block) = self.next_block(&cursors) {
            let tag = tags[block.tag];
            let payload = &self.raw[block.inner_start..block.inner_end];

            match decode(payload, self.format) {
                Ok(decoded) => {
                    let call = ToolCall::from_decoded(decoded, tag.dialect);
                    tracing::debug!(tool = %call.name, dialect = %tag.dialect, "Detected tool call");
                    let source = self.remove_block(block, &mut cursors);
                    self.pending.push(Pending {
                        pos: block.start,
                        source,
                        segment: Segment::ToolCall(call.clone()),
                    });
                    detected.push(call);
                }
                Err(err) if finishing => {
                    tracing::warn!(dialect = %tag.dialect, error = %err, "Tool call block did not decode");
                    let malformed = MalformedCall {
                        dialect: tag.dialect,
                        raw: self.raw[block.start..block.end].to_string(),
                        reason: err.to_string(),
                    };
                    let source = self.remove_block(block, &mut cursors);
                    self.pending.push(Pending {
                        pos: block.start,
                        source,
                        segment: Segment::Malformed(malformed),
                    });
                }
                Err(err) => {
                    tracing::trace!(dialect = %tag.dialect, error = %err, "Holding undecodable block");
                    cursors[block.tag] = block.inner_start;
                }
            }
        }

        detected
    }

    /// Earliest-closing complete block at or after each dialect's cursor.
    fn next_block(&self, cursors: &[usize]) -> Option<Block> {
        self.tags
            .iter()
            .enumerate()
            .filter_map(|(i, tag)| {
                let start = self.raw[cursors[i]..].find(tag.open)? + cursors[i];
                let inner_start = start + tag.open.len();
                let inner_end = self.raw[inner_start..].find(tag.close)? + inner_start;
                Some(Block {
                    tag: i,
                    start,
                    inner_start,
                    inner_end,
                    end: inner_end + tag.close.len(),
                })
            })
            .min_by_key(|block| (block.inner_end, block.tag))
    }

    /// Cut a block out of the raw text and return its source offset.
    fn remove_block(&mut self, block: Block, cursors: &mut [usize]) -> usize {
        let removed = block.end - block.start;
        let source = block.start
            + self
                .removals
                .iter()
                .filter(|(anchor, _)| *anchor <= block.start)
                .map(|(_, len)| len)
                .sum::<usize>();
        self.raw.replace_range(block.start..block.end, "");

        let shift = |pos: usize| {
            if pos >= block.end {
                pos - removed
            } else if pos > block.start {
                block.start
            } else {
                pos
            }
        };

        for cursor in cursors.iter_mut() {
            *cursor = shift(*cursor);
        }
        for pending in &mut self.pending {
            pending.pos = shift(pending.pos);
        }
        for (anchor, _) in &mut self.removals {
            *anchor = shift(*anchor);
        }

        self.removals.push((block.start, removed));
        source
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of an open tag.
fn partial_open_len(text: &str, tags: &[TagPair]) -> usize {
    tags.iter()
        .filter_map(|tag| {
            (1..tag.open.len())
                .rev()
                .find(|&k| text.ends_with(&tag.open[..k]))
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_buffer() -> DialectBuffer {
        DialectBuffer::new(DialectMode::Tool, PayloadFormat::Json)
    }

    #[test]
    fn test_split_open_tag() {
        let mut buffer = tool_buffer();

        assert!(buffer.push("<to").is_empty());
        assert_eq!(buffer.visible_content(), "");

        assert!(buffer.push("ol_call>{\"name\":\"x\",\"argum").is_empty());
        assert_eq!(buffer.visible_content(), "");

        let calls = buffer.push("ents\":{}}</tool_call>");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "x");
        assert!(calls[0].arguments.is_empty());
        assert_eq!(calls[0].dialect, CallDialect::Tool);
    }

    #[test]
    fn test_no_leakage_at_any_split() {
        let text = r#"Before <tool_call>{"name":"x","arguments":{"a":1}}</tool_call> after"#;

        for size in 1..text.len() {
            let mut buffer = tool_buffer();
            let mut calls = Vec::new();
            let mut visible_len = 0;

            for chunk in text.as_bytes().chunks(size) {
                calls.extend(buffer.push(std::str::from_utf8(chunk).unwrap()));
                let visible = buffer.visible_content();
                assert!(!visible.contains('<'), "leaked tag at chunk size {size}: {visible:?}");
                assert!(!visible.contains("name"), "leaked payload at chunk size {size}");
                assert!(visible.len() >= visible_len);
                visible_len = visible.len();
            }

            assert_eq!(calls.len(), 1, "chunk size {size}");
            assert_eq!(buffer.visible_content(), "Before  after");
        }
    }

    #[test]
    fn test_multiple_calls_in_one_push() {
        let mut buffer = DialectBuffer::new(DialectMode::Auto, PayloadFormat::Json);
        let calls = buffer.push(
            r#"a <tool_use>{"name":"first"}</tool_use> b <function_call>{"name":"second"}</function_call> c"#,
        );

        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(calls[0].dialect, CallDialect::ToolUse);
        assert_eq!(calls[1].dialect, CallDialect::FunctionCalling);

        let segments = buffer.drain_segments();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0], Segment::Content("a ".into()));
        assert!(matches!(&segments[1], Segment::ToolCall(c) if c.name == "first"));
        assert_eq!(segments[2], Segment::Content(" b ".into()));
        assert!(matches!(&segments[3], Segment::ToolCall(c) if c.name == "second"));
        assert_eq!(segments[4], Segment::Content(" c".into()));
    }

    #[test]
    fn test_inactive_dialect_is_content() {
        let mut buffer = tool_buffer();
        let calls = buffer.push(r#"<tool_use>{"name":"x"}</tool_use>"#);
        assert!(calls.is_empty());
        assert_eq!(buffer.visible_content(), r#"<tool_use>{"name":"x"}</tool_use>"#);

        let mut buffer = DialectBuffer::new(DialectMode::None, PayloadFormat::Json);
        assert!(buffer.push(r#"<tool_call>{"name":"x"}</tool_call>"#).is_empty());
        assert_eq!(buffer.drain_segments().len(), 1);
    }

    #[test]
    fn test_undecodable_block_held_until_finish() {
        let mut buffer = tool_buffer();
        let calls = buffer.push(
            r#"one <tool_call>not a call</tool_call> two <tool_call>{"name":"ok"}</tool_call> three"#,
        );

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "ok");
        assert_eq!(buffer.visible_content(), "one ");
        assert_eq!(buffer.drain_segments(), vec![Segment::Content("one ".into())]);

        let rest = buffer.finish();
        assert!(matches!(&rest[0], Segment::Malformed(m) if m.raw == "<tool_call>not a call</tool_call>"));
        assert_eq!(rest[1], Segment::Content(" two ".into()));
        assert!(matches!(&rest[2], Segment::ToolCall(c) if c.name == "ok"));
        assert_eq!(rest[3], Segment::Content(" three".into()));
    }

    #[test]
    fn test_adjacent_malformed_and_valid_blocks_keep_order() {
        let mut buffer = tool_buffer();
        let calls = buffer.push(r#"<tool_call>bad</tool_call><tool_call>{"name":"ok"}</tool_call>"#);
        assert_eq!(calls.len(), 1);

        let segments = buffer.finish();
        assert_eq!(segments.len(), 2);
        assert!(matches!(&segments[0], Segment::Malformed(m) if m.raw == "<tool_call>bad</tool_call>"));
        assert!(matches!(&segments[1], Segment::ToolCall(c) if c.name == "ok"));
    }

    #[test]
    fn test_source_order_after_several_removals() {
        let mut buffer = tool_buffer();
        buffer.push(r#"<tool_call>{"name":"a"}</tool_call><tool_call>x</tool_call>"#);
        buffer.push(r#"<tool_call>{"name":"b"}</tool_call><tool_call>y</tool_call>"#);
        buffer.push(r#"<tool_call>{"name":"c"}</tool_call>"#);

        let order: Vec<String> = buffer
            .finish()
            .into_iter()
            .map(|segment| match segment {
                Segment::ToolCall(call) => call.name,
                Segment::Malformed(m) => m.raw,
                Segment::Content(text) => text,
            })
            .collect();

        assert_eq!(
            order,
            vec![
                "a",
                "<tool_call>x</tool_call>",
                "b",
                "<tool_call>y</tool_call>",
                "c"
            ]
        );
    }

    #[test]
    fn test_visible_content_grows_past_held_block() {
        let text = r#"one <tool_call>oops</tool_call> two <tool_call>{"name":"ok"}</tool_call> three"#;

        for size in 1..text.len() {
            let mut buffer = tool_buffer();
            let mut calls = Vec::new();
            let mut visible_len = 0;

            for chunk in text.as_bytes().chunks(size) {
                calls.extend(buffer.push(std::str::from_utf8(chunk).unwrap()));
                let visible = buffer.visible_content();
                assert!(!visible.contains("oops"), "held block leaked at chunk size {size}");
                assert!(visible.len() >= visible_len, "visible shrank at chunk size {size}");
                visible_len = visible.len();
            }

            assert_eq!(calls.len(), 1, "chunk size {size}");
            assert_eq!(buffer.visible_content(), "one ");
        }
    }

    #[test]
    fn test_drain_streaming_releases_calls_behind_held_block() {
        let mut buffer = tool_buffer();
        buffer.push("x <tool_call>oops</tool_call> y ");
        assert_eq!(buffer.drain_streaming(), vec![Segment::Content("x ".into())]);

        buffer.push(r#"<tool_call>{"name":"ok"}</tool_call>"#);
        let segments = buffer.drain_streaming();
        assert_eq!(segments.len(), 1);
        assert!(matches!(&segments[0], Segment::ToolCall(c) if c.name == "ok"));

        buffer.push(" more");
        assert!(buffer.drain_streaming().is_empty());

        let rest = buffer.finish();
        assert!(matches!(&rest[0], Segment::Malformed(_)));
        assert_eq!(rest[1], Segment::Content(" y  more".into()));
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_unterminated_block_released_on_finish() {
        let mut buffer = tool_buffer();
        buffer.push("hi <tool_call>{\"name\":");
        assert_eq!(buffer.visible_content(), "hi ");
        assert_eq!(buffer.drain_segments(), vec![Segment::Content("hi ".into())]);

        let rest = buffer.finish();
        assert_eq!(rest, vec![Segment::Content("<tool_call>{\"name\":".into())]);
    }

    #[test]
    fn test_fenced_payload_across_pushes() {
        let mut buffer = tool_buffer();
        assert!(buffer.push("<tool_call>\n``").is_empty());
        assert!(buffer.push("`json\n{\"name\":\"f\",\"arguments\":{\"k\":\"v\"}}\n`").is_empty());
        let calls = buffer.push("``\n</tool_call>");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["k"], json!("v"));
    }

    #[test]
    fn test_dialect_mode_from_str() {
        assert_eq!("tool_use".parse::<DialectMode>().unwrap(), DialectMode::ToolUse);
        assert_eq!("NONE".parse::<DialectMode>().unwrap(), DialectMode::None);
        assert!("xml".parse::<DialectMode>().is_err());
        assert_eq!(DialectMode::Auto.tags().len(), 3);
    }
}
