//! Tool System
//!
//! Call requests, call results, and the registry the orchestrator resolves
//! names against. Tools are registered on an explicit [`ToolRegistry`] that
//! the caller builds once and hands to the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::decode::{DecodedCall, PayloadFormat};
use crate::dialect::CallDialect;
use crate::error::{AgentError, Result};

/// Tool call request detected in model output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Optional call ID used for deduplication
    #[serde(default)]
    pub id: Option<String>,

    /// Tool identifier
    pub name: String,

    /// Arguments in the order the model wrote them
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// How the call was marked up
    pub dialect: CallDialect,

    /// Format the payload decoded as
    pub format: PayloadFormat,
}

impl ToolCall {
    /// A call mapped from structured provider fields
    pub fn native(id: Option<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id,
            name: name.into(),
            arguments,
            dialect: CallDialect::Native,
            format: PayloadFormat::Json,
        }
    }

    pub(crate) fn from_decoded(decoded: DecodedCall, dialect: CallDialect) -> Self {
        Self {
            id: decoded.id,
            name: decoded.name,
            arguments: decoded.arguments,
            dialect,
            format: decoded.format,
        }
    }
}

/// Outcome of a single execution attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum ToolOutcome {
    Success(Value),
    Failure(String),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }
}

/// Result from tool execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Tool that was called
    pub name: String,

    /// Arguments as requested by the model
    pub arguments: Map<String, Value>,

    pub outcome: ToolOutcome,

    /// Wall-clock time spent on the attempt
    pub elapsed_ms: u64,
}

impl ToolResult {
    pub fn success(call: &ToolCall, value: Value) -> Self {
        Self::new(call, ToolOutcome::Success(value))
    }

    pub fn failure(call: &ToolCall, reason: impl Into<String>) -> Self {
        Self::new(call, ToolOutcome::Failure(reason.into()))
    }

    /// Failure for a call block that never decoded, so has no name
    pub fn undecodable(reason: impl Into<String>) -> Self {
        Self {
            id: None,
            name: String::new(),
            arguments: Map::new(),
            outcome: ToolOutcome::Failure(reason.into()),
            elapsed_ms: 0,
        }
    }

    fn new(call: &ToolCall, outcome: ToolOutcome) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            outcome,
            elapsed_ms: 0,
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Text placed in the conversation for this result
    pub fn output_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(Value::String(s)) => s.clone(),
            ToolOutcome::Success(value) => value.to_string(),
            ToolOutcome::Failure(reason) => reason.clone(),
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Coerce a supplied value to the declared type.
    fn coerce(&self, value: &Value) -> Result<Value> {
        let coerced = match (self.param_type.as_str(), value) {
            ("string", Value::String(_)) => Some(value.clone()),
            ("string", Value::Number(n)) => Some(Value::String(n.to_string())),
            ("string", Value::Bool(b)) => Some(Value::String(b.to_string())),

            ("number", Value::Number(_)) => Some(value.clone()),
            ("number", Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),

            ("integer", Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(exact_i64))
                .map(Value::from),
            ("integer", Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),

            ("boolean", Value::Bool(_)) => Some(value.clone()),
            ("boolean", Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },

            ("object", Value::Object(_)) | ("array", Value::Array(_)) => Some(value.clone()),
            ("object" | "array", Value::String(s)) => serde_json::from_str::<Value>(s)
                .ok()
                .filter(|v| v.is_object() == (self.param_type == "object") && (v.is_object() || v.is_array())),

            ("string" | "number" | "integer" | "boolean" | "object" | "array", _) => None,

            // Unknown or "any": accept as-is
            _ => Some(value.clone()),
        };

        let coerced = coerced.ok_or_else(|| {
            AgentError::ToolValidation(format!(
                "parameter '{}' expected {}, got {}",
                self.name, self.param_type, value
            ))
        })?;

        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(&coerced) {
                return Err(AgentError::ToolValidation(format!(
                    "parameter '{}' must be one of {}",
                    self.name,
                    Value::Array(allowed.clone())
                )));
            }
        }

        Ok(coerced)
    }
}

/// A whole-valued float that fits in an `i64` without saturating
fn exact_i64(f: f64) -> Option<i64> {
    // 2^63; i64::MAX itself is not representable as f64
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-BOUND..BOUND).contains(&f)).then(|| f as i64)
}

/// Tool definition schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// Validate arguments, filling defaults and coercing declared types.
    /// Arguments the schema does not mention are passed through untouched.
    pub fn coerce(&self, arguments: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut coerced = arguments.clone();

        for param in &self.parameters {
            match arguments.get(&param.name) {
                Some(value) => {
                    coerced.insert(param.name.clone(), param.coerce(value)?);
                }
                None if param.required => {
                    return Err(AgentError::ToolValidation(format!(
                        "missing required parameter: {}",
                        param.name
                    )));
                }
                None => {
                    if let Some(default) = &param.default {
                        coerced.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }

        Ok(coerced)
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's argument schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool. `call.arguments` has already been validated.
    async fn execute(&self, call: &ToolCall) -> Result<Value>;

    /// Validate and coerce arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<Map<String, Value>> {
        self.schema().coerce(&call.arguments)
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name.clone(), Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name.clone(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Resolve and validate a call without running it
    pub fn prepare(&self, call: &ToolCall) -> Result<(Arc<dyn Tool>, ToolCall)> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let arguments = tool.validate(call)?;
        let prepared = ToolCall {
            arguments,
            ..call.clone()
        };

        Ok((tool, prepared))
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
