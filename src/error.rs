//! Error types for agent-forge operations.
//!
//! Defines the error types shared across subsystems:
//! - Simulation environment invocation
//! - Domain loading and load-time invariant checks
//! - Configuration
//! - Reasoning backend (LLM) interactions
//!
//! Component-specific recoverable errors (analysis, generation) live next to
//! the components in [`crate::agents::error`].

use thiserror::Error;

/// Errors returned by [`crate::environment::SimulationEnvironment::invoke`].
///
/// These never abort an agent run: the driver records them on the
/// corresponding tool call and continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnvironmentError {
    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("No mock response for tool '{tool}' with arguments {arguments}")]
    NoMockResponse { tool: String, arguments: String },

    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl EnvironmentError {
    /// Short machine-readable kind, used in trajectories and prompts.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvironmentError::UnknownTool { .. } => "unknown_tool",
            EnvironmentError::NoMockResponse { .. } => "no_mock_response",
            EnvironmentError::InvalidArguments { .. } => "invalid_arguments",
        }
    }
}

/// Fatal errors raised while loading a domain description.
///
/// Any of these aborts the run before the first round starts.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Duplicate tool name '{0}'")]
    DuplicateTool(String),

    #[error("Duplicate scenario id '{0}'")]
    DuplicateScenario(String),

    #[error("Scenario '{scenario}' references unknown tool '{tool}'")]
    MissingTool { scenario: String, tool: String },

    #[error("Scenario '{scenario}' failed validation: {}", errors.join("; "))]
    InvalidScenario {
        scenario: String,
        errors: Vec<String>,
    },

    #[error("Domain defines no tools")]
    NoTools,

    #[error("Domain defines no scenarios")]
    NoScenarios,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration errors, raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors that can occur during reasoning backend operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Replay script exhausted after {0} responses")]
    ReplayExhausted(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_error_kind() {
        let err = EnvironmentError::UnknownTool {
            name: "fly".to_string(),
        };
        assert_eq!(err.kind(), "unknown_tool");
        assert_eq!(err.to_string(), "Unknown tool 'fly'");
    }

    #[test]
    fn test_invalid_scenario_message_joins_errors() {
        let err = DomainError::InvalidScenario {
            scenario: "s1".to_string(),
            errors: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Scenario 's1' failed validation: a; b");
    }
}
