//! Payload Decoder
//!
//! Turns the text found between a pair of dialect tags into a call name and
//! its arguments. Three encodings are understood: JSON (the default most
//! models are prompted with), YAML, and a minimal XML shape made of a
//! `<name>` element and an `<arguments>` element.
//!
//! The decoder is stateless. With [`PayloadFormat::Auto`] the formats are
//! tried in a fixed order (JSON, YAML, XML) and the first success wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::AgentError;

/// Key under which arguments are stored when they are not a mapping
pub const RAW_ARGUMENTS_KEY: &str = "_raw";

/// Serialization format of a call payload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Json,
    Yaml,
    Xml,
    /// Try JSON, then YAML, then XML
    #[default]
    Auto,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Json => write!(f, "json"),
            PayloadFormat::Yaml => write!(f, "yaml"),
            PayloadFormat::Xml => write!(f, "xml"),
            PayloadFormat::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(PayloadFormat::Json),
            "yaml" | "yml" => Ok(PayloadFormat::Yaml),
            "xml" => Ok(PayloadFormat::Xml),
            "auto" => Ok(PayloadFormat::Auto),
            other => Err(AgentError::Config(format!("unknown payload format: {other}"))),
        }
    }
}

/// Why a payload could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(String),

    #[error("invalid YAML payload: {0}")]
    Yaml(String),

    #[error("invalid XML payload: {0}")]
    Xml(String),

    /// Parsed fine, but does not have the shape of a call
    #[error("payload is not a tool call: {0}")]
    NotACall(String),

    /// Every format tried by `auto` failed
    #[error("payload matched no format (json: {json}; yaml: {yaml}; xml: {xml})")]
    Exhausted {
        json: String,
        yaml: String,
        xml: String,
    },
}

/// A successfully decoded call payload
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedCall {
    /// Call identifier, when the payload carried one
    pub id: Option<String>,

    /// Tool name
    pub name: String,

    /// Arguments in the order they appeared
    pub arguments: Map<String, Value>,

    /// Format that actually decoded the payload (never `Auto`)
    pub format: PayloadFormat,
}

/// Decode a single call payload.
pub fn decode(payload: &str, format: PayloadFormat) -> Result<DecodedCall, DecodeError> {
    let body = strip_fence(payload);

    match format {
        PayloadFormat::Json => decode_json(body),
        PayloadFormat::Yaml => decode_yaml(body),
        PayloadFormat::Xml => decode_xml(body),
        PayloadFormat::Auto => {
            let json = match decode_json(body) {
                Ok(call) => return Ok(call),
                Err(e) => e,
            };
            let yaml = match decode_yaml(body) {
                Ok(call) => return Ok(call),
                Err(e) => e,
            };
            let xml = match decode_xml(body) {
                Ok(call) => return Ok(call),
                Err(e) => e,
            };
            Err(DecodeError::Exhausted {
                json: json.to_string(),
                yaml: yaml.to_string(),
                xml: xml.to_string(),
            })
        }
    }
}

/// Remove one enclosing markdown fence, including its language tag.
pub fn strip_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };

    let inner = match inner.find('\n') {
        Some(nl)
            if inner[..nl]
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            &inner[nl + 1..]
        }
        _ => inner,
    };

    inner.trim()
}

fn decode_json(body: &str) -> Result<DecodedCall, DecodeError> {
    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            let object = first_balanced_object(body)
                .ok_or_else(|| DecodeError::Json(err.to_string()))?;
            serde_json::from_str::<Value>(object)
                .map_err(|e| DecodeError::Json(e.to_string()))?
        }
    };

    call_from_value(value, PayloadFormat::Json)
}

fn decode_yaml(body: &str) -> Result<DecodedCall, DecodeError> {
    let value = serde_yaml::from_str::<Value>(body)
        .map_err(|e| DecodeError::Yaml(e.to_string()))?;

    call_from_value(value, PayloadFormat::Yaml)
}

fn decode_xml(body: &str) -> Result<DecodedCall, DecodeError> {
    let name = element_text(body, "name")
        .ok_or_else(|| DecodeError::Xml("missing <name> element".into()))?
        .trim();

    if name.is_empty() {
        return Err(DecodeError::Xml("empty <name> element".into()));
    }

    let arguments = match element_text(body, "arguments") {
        Some(inner) => arguments_from_text(inner.trim()),
        None => Map::new(),
    };

    Ok(DecodedCall {
        id: None,
        name: name.to_string(),
        arguments,
        format: PayloadFormat::Xml,
    })
}

/// Inner text of the first `<tag>...</tag>` pair.
fn element_text<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(&body[start..end])
}

/// `<arguments>` bodies: JSON, then YAML, then the raw text.
fn arguments_from_text(text: &str) -> Map<String, Value> {
    if text.is_empty() {
        return Map::new();
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return map;
    }

    if let Ok(Value::Object(map)) = serde_yaml::from_str::<Value>(text) {
        return map;
    }

    raw_arguments(text)
}

fn raw_arguments(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(RAW_ARGUMENTS_KEY.into(), Value::String(text.to_string()));
    map
}

/// Extract name, arguments and id from a parsed JSON/YAML document.
fn call_from_value(value: Value, format: PayloadFormat) -> Result<DecodedCall, DecodeError> {
    let Value::Object(mut obj) = value else {
        return Err(DecodeError::NotACall(format!(
            "expected a mapping, found {}",
            describe(&value)
        )));
    };

    let id = obj.get("id").and_then(Value::as_str).map(str::to_owned);

    // OpenAI-style {"function": {"name": ..., "arguments": ...}}
    if !obj.contains_key("name") {
        if let Some(Value::Object(inner)) = obj.remove("function") {
            obj = inner;
        }
    }

    let name = ["name", "tool"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DecodeError::NotACall("missing \"name\" field".into()))?
        .to_owned();

    let raw = ["arguments", "parameters", "input"]
        .iter()
        .find_map(|key| obj.remove(*key));

    Ok(DecodedCall {
        id,
        name,
        arguments: arguments_from_value(raw)?,
        format,
    })
}

/// Normalize an `arguments` value into a mapping.
pub fn arguments_from_value(raw: Option<Value>) -> Result<Map<String, Value>, DecodeError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(Map::new());
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => Ok(map),
                _ => Ok(raw_arguments(&text)),
            }
        }
        Some(other) => Err(DecodeError::NotACall(format!(
            "\"arguments\" must be a mapping, found {}",
            describe(&other)
        ))),
    }
}

/// First `{...}` with balanced braces, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
