//! Error Types

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Upstream model call failed (transport concern, never recovered here)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited by the provider
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Call arrived without a usable name
    #[error("missing tool name")]
    MissingToolName,

    /// Tool not found in registry
    #[error("tool not registered: {0}")]
    ToolNotFound(String),

    /// Tool arguments failed schema validation
    #[error("invalid arguments: {0}")]
    ToolValidation(String),

    /// Tool handler returned an error
    #[error("tool failed: {0}")]
    ToolExecution(String),

    /// Tool handler exceeded its time bound
    #[error("timeout")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Io(_)
        )
    }

    /// Short text suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(_) | AgentError::ProviderUnavailable(_) => {
                "The model could not be reached.".into()
            }
            AgentError::RateLimited(_) => "Too many requests to the model; try again shortly.".into(),
            AgentError::ToolNotFound(name) => format!("No tool named '{name}' is available."),
            AgentError::ToolValidation(msg) => format!("A tool was called with bad arguments: {msg}"),
            AgentError::ToolExecution(msg) => format!("A tool failed: {msg}"),
            AgentError::Timeout => "A tool took too long to respond.".into(),
            _ => "Something went wrong.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        assert_eq!(AgentError::Timeout.to_string(), "timeout");
        assert_eq!(AgentError::MissingToolName.to_string(), "missing tool name");
        assert_eq!(
            AgentError::ToolNotFound("x".into()).to_string(),
            "tool not registered: x"
        );
    }

    #[test]
    fn test_classification() {
        assert!(AgentError::RateLimited("slow down".into()).is_retryable());
        assert!(!AgentError::Provider("500".into()).is_retryable());
        assert_eq!(AgentError::Timeout.user_message(), "A tool took too long to respond.");
    }
}
