//! Error types for Helm.
//!
//! Only setup-time problems surface as [`HelmError`] from the public API.
//! Failures inside a run (tool errors, rejections, model hiccups) are folded
//! into tool results or the final [`AgentResult`](crate::agent_loop::AgentResult).

use thiserror::Error;

/// Primary error type for all Helm operations.
#[derive(Error, Debug)]
pub enum HelmError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Run task failed: {0}")]
    TaskFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    ToolExecution,
    Timeout,
    Model,
    RateLimit,
    Transient,
    Canceled,
    Serialization,
    Internal,
}

impl HelmError {
    /// Shorthand for a tool failure.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::UnknownTool(_) | Self::InvalidArgument(_) | Self::Toml(_) => {
                ErrorCategory::Configuration
            }
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Model(_) | Self::Stream(_) => ErrorCategory::Model,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Transient(_) => ErrorCategory::Transient,
            Self::Canceled => ErrorCategory::Canceled,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::TaskFailed(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error is worth another attempt.
    ///
    /// Timeouts are not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Transient
        )
    }

    /// Whether this error means the engine was set up incorrectly.
    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HelmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(HelmError::Transient("reset".into()).is_retryable());
        assert!(HelmError::RateLimited { retry_after_ms: Some(10) }.is_retryable());
        assert!(!HelmError::Timeout(100).is_retryable());
        assert!(!HelmError::tool("bash", "exit 1").is_retryable());
        assert!(!HelmError::Canceled.is_retryable());
    }

    #[test]
    fn setup_errors_are_configuration() {
        assert!(HelmError::UnknownTool("nope".into()).is_configuration());
        assert!(HelmError::Configuration("max_iterations".into()).is_configuration());
        assert_eq!(HelmError::Model("boom".into()).category().to_string(), "model");
    }
}
