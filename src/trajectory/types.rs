//! Trajectory data types for agent run recording.
//!
//! A trajectory is the full record of one agent run against one scenario:
//! every backend turn, every tool call with the environment's answer, and
//! how the run ended. Trajectories are read-only once finalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EnvironmentError;
use crate::llm::Usage;

/// A complete record of an agent run on a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Unique identifier for this trajectory.
    pub id: Uuid,

    /// Identifier of the scenario that was run.
    pub scenario_id: String,

    /// Model used for the agent.
    pub model: String,

    /// Turns in the order the backend produced them.
    pub turns: Vec<Turn>,

    /// How the run ended.
    pub terminal: TerminalState,

    /// The agent's final answer, when the run completed.
    pub final_answer: Option<String>,

    /// When the trajectory was created.
    pub created_at: DateTime<Utc>,

    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,

    /// Token usage statistics for the run.
    pub token_usage: TokenUsage,
}

impl Trajectory {
    /// Every tool call, across all turns, in order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.turns
            .iter()
            .filter_map(|turn| match &turn.action {
                TurnAction::ToolCalls { calls } => Some(calls.iter()),
                _ => None,
            })
            .flatten()
    }

    /// Names of the tools called, in order.
    pub fn tool_sequence(&self) -> Vec<&str> {
        self.tool_calls().map(|c| c.name.as_str()).collect()
    }

    /// Returns true if the agent emitted a final answer.
    pub fn is_completed(&self) -> bool {
        matches!(self.terminal, TerminalState::Completed)
    }

    /// Number of turns whose output could not be parsed.
    pub fn malformed_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t.action, TurnAction::Malformed { .. }))
            .count()
    }

    /// Number of tool calls the environment rejected.
    pub fn tool_errors(&self) -> usize {
        self.tool_calls().filter(|c| c.outcome.is_error()).count()
    }
}

/// One backend turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Sequential turn number (0-indexed).
    pub step: u32,

    /// Raw backend output (text content; native calls are rendered as JSON).
    pub raw_output: String,

    /// What the turn was interpreted as.
    pub action: TurnAction,

    /// When this turn was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Interpretation of a backend turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnAction {
    /// The agent answered; the run is complete.
    FinalAnswer { answer: String },

    /// The agent called one or more tools.
    ToolCalls { calls: Vec<ToolCall> },

    /// The output was neither an answer nor a tool call.
    Malformed { reason: String },

    /// The backend call itself failed.
    BackendError { message: String },
}

/// A tool call with the environment's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool called.
    pub name: String,

    /// Arguments exactly as the agent provided them.
    pub arguments: Value,

    /// What the environment returned.
    pub outcome: ToolOutcome,
}

impl ToolCall {
    /// Builds a call from the result of [`crate::environment::SimulationEnvironment::invoke`].
    pub fn from_result(
        name: impl Into<String>,
        arguments: Value,
        result: Result<Value, EnvironmentError>,
    ) -> Self {
        let outcome = match result {
            Ok(response) => ToolOutcome::Response { response },
            Err(e) => ToolOutcome::Error {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        };
        Self {
            name: name.into(),
            arguments,
            outcome,
        }
    }

    /// The successful response, if any.
    pub fn response(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Response { response } => Some(response),
            ToolOutcome::Error { .. } => None,
        }
    }
}

/// Result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Response { response: Value },
    Error { kind: String, message: String },
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    /// Text fed back to the agent.
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Response { response: Value::String(s) } => s.clone(),
            ToolOutcome::Response { response } => response.to_string(),
            ToolOutcome::Error { message, .. } => format!("Error: {}", message),
        }
    }
}

/// How a trajectory ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    /// The agent emitted a final answer.
    Completed,
    /// The run was cut short.
    Truncated { reason: TruncationReason },
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Completed => f.write_str("completed"),
            TerminalState::Truncated { reason } => write!(f, "truncated: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    /// The turn cap was reached.
    TurnLimit,
    /// Too many turns could not be parsed.
    MalformedOutput,
    /// Too many turns failed in the backend.
    BackendFailure,
}

impl std::fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TruncationReason::TurnLimit => "turn limit",
            TruncationReason::MalformedOutput => "malformed output",
            TruncationReason::BackendFailure => "backend failure",
        })
    }
}

/// Token usage statistics for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompts.
    pub prompt_tokens: u32,

    /// Number of tokens in the completions.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Creates a new TokenUsage with the specified values.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Adds another TokenUsage to this one.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl From<&Usage> for TokenUsage {
    fn from(usage: &Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_usage_add() {
        let mut usage = TokenUsage::new(100, 50);
        usage.add(&TokenUsage::new(200, 100));
        assert_eq!(usage.prompt_tokens, 300);
        assert_eq!(usage.completion_tokens, 150);
        assert_eq!(usage.total_tokens, 450);
    }

    #[test]
    fn test_tool_call_from_error() {
        let call = ToolCall::from_result(
            "fly",
            json!({}),
            Err(EnvironmentError::UnknownTool {
                name: "fly".to_string(),
            }),
        );
        assert!(call.outcome.is_error());
        assert!(call.response().is_none());
        assert_eq!(call.outcome.render(), "Error: Unknown tool 'fly'");
    }

    #[test]
    fn test_outcome_render_string_unquoted() {
        let outcome = ToolOutcome::Response {
            response: json!("pong"),
        };
        assert_eq!(outcome.render(), "pong");
        let outcome = ToolOutcome::Response {
            response: json!({"status": "shipped"}),
        };
        assert_eq!(outcome.render(), r#"{"status":"shipped"}"#);
    }

    #[test]
    fn test_terminal_state_display_and_serde() {
        let state = TerminalState::Truncated {
            reason: TruncationReason::MalformedOutput,
        };
        assert_eq!(state.to_string(), "truncated: malformed output");
        let json = serde_json::to_value(state).expect("serialize");
        assert_eq!(json["state"], "truncated");
        assert_eq!(json["reason"], "malformed_output");
    }

    #[test]
    fn test_turn_action_serialization() {
        let action = TurnAction::Malformed {
            reason: "no json".to_string(),
        };
        let json = serde_json::to_value(&action).expect("serialize");
        assert_eq!(json["type"], "malformed");
    }
}
