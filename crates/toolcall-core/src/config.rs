//! Orchestrator Configuration
//!
//! Defaults suit a local model prompted with `<tool_call>` JSON. Every
//! field can come from serde (per-conversation templates) or from
//! `TOOLCALL_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decode::PayloadFormat;
use crate::dialect::DialectMode;
use crate::error::AgentError;
use crate::provider::GenerationOptions;

/// How content segments of one round are written to history
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// One assistant message with all content of the round
    #[default]
    Join,
    /// One assistant message per content segment
    Separate,
}

impl FromStr for CombineMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join" => Ok(CombineMode::Join),
            "separate" => Ok(CombineMode::Separate),
            other => Err(AgentError::Config(format!("unknown combine mode: {other}"))),
        }
    }
}

/// Orchestrator configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// System prompt placed at the top of history, if any
    pub system_prompt: Option<String>,

    /// Maximum model invocations per episode; at least 1
    pub max_iterations: usize,

    /// Feed tool results back to the model until it stops calling tools
    pub agentic: bool,

    /// Per-call bound on a tool handler
    pub tool_timeout_ms: u64,

    /// How a round's content is written to history
    pub combine: CombineMode,

    /// Dialects scanned for in text output
    pub dialect: DialectMode,

    /// Payload format inside dialect tags
    pub format: PayloadFormat,

    /// Size of the recent-results log
    pub recent_results_capacity: usize,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 10,
            agentic: true,
            tool_timeout_ms: 30_000,
            combine: CombineMode::Join,
            dialect: DialectMode::Auto,
            format: PayloadFormat::Auto,
            recent_results_capacity: 32,
            generation: GenerationOptions::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Read `TOOLCALL_*` overrides from the environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "TOOLCALL_MAX_ITERATIONS") {
            config.max_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, "TOOLCALL_AGENTIC") {
            config.agentic = v;
        }
        if let Some(v) = parse_var(&lookup, "TOOLCALL_TOOL_TIMEOUT_MS") {
            config.tool_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "TOOLCALL_DIALECT") {
            config.dialect = v;
        }
        if let Some(v) = parse_var(&lookup, "TOOLCALL_FORMAT") {
            config.format = v;
        }
        if let Some(v) = parse_var(&lookup, "TOOLCALL_COMBINE") {
            config.combine = v;
        }
        if let Some(model) = lookup("TOOLCALL_MODEL") {
            config.generation.model = model;
        }

        config
    }

    /// Reject settings no turn can run under
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring invalid configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert!(config.agentic);
        assert_eq!(config.tool_timeout(), Duration::from_secs(30));
        assert_eq!(config.dialect, DialectMode::Auto);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TOOLCALL_MAX_ITERATIONS", "3"),
            ("TOOLCALL_AGENTIC", "false"),
            ("TOOLCALL_DIALECT", "tool_use"),
            ("TOOLCALL_FORMAT", "yaml"),
            ("TOOLCALL_TOOL_TIMEOUT_MS", "not-a-number"),
            ("TOOLCALL_MODEL", "qwen2.5"),
        ]);

        let config = OrchestratorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_iterations, 3);
        assert!(!config.agentic);
        assert_eq!(config.dialect, DialectMode::ToolUse);
        assert_eq!(config.format, PayloadFormat::Yaml);
        assert_eq!(config.tool_timeout_ms, 30_000);
        assert_eq!(config.generation.model, "qwen2.5");
    }

    #[test]
    fn test_validate() {
        assert!(OrchestratorConfig::default().validate().is_ok());

        let config = OrchestratorConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"dialect": "function_calling", "combine": "separate"}"#).unwrap();
        assert_eq!(config.dialect, DialectMode::FunctionCalling);
        assert_eq!(config.combine, CombineMode::Separate);
        assert_eq!(config.max_iterations, 10);
    }
}
