//! Trajectory collector for recording agent runs.
//!
//! The driver records each backend turn as it happens; when the run ends it
//! calls [`TrajectoryCollector::finalize`] with the terminal state.

use chrono::Utc;
use uuid::Uuid;

use super::types::{TerminalState, TokenUsage, ToolCall, Trajectory, Turn, TurnAction};

/// Accumulates turns for one agent run.
pub struct TrajectoryCollector {
    /// The trajectory being built.
    trajectory: Trajectory,

    /// Turns that could not be parsed so far.
    malformed: usize,

    /// Turns where the backend failed so far.
    backend_failures: usize,
}

impl TrajectoryCollector {
    /// Creates a new trajectory collector.
    ///
    /// # Arguments
    ///
    /// * `scenario_id` - Identifier of the scenario being run
    /// * `model` - Name of the model being used
    pub fn new(scenario_id: &str, model: &str) -> Self {
        Self {
            trajectory: Trajectory {
                id: Uuid::new_v4(),
                scenario_id: scenario_id.to_string(),
                model: model.to_string(),
                turns: Vec::new(),
                terminal: TerminalState::Completed,
                final_answer: None,
                created_at: Utc::now(),
                duration_ms: 0,
                token_usage: TokenUsage::default(),
            },
            malformed: 0,
            backend_failures: 0,
        }
    }

    fn push(&mut self, raw_output: String, action: TurnAction) {
        let step = self.trajectory.turns.len() as u32;
        self.trajectory.turns.push(Turn {
            step,
            raw_output,
            action,
            timestamp: Utc::now(),
        });
    }

    /// Records a final answer.
    pub fn record_final_answer(&mut self, raw_output: String, answer: String) {
        self.trajectory.final_answer = Some(answer.clone());
        self.push(raw_output, TurnAction::FinalAnswer { answer });
    }

    /// Records a turn of tool calls, already answered by the environment.
    pub fn record_tool_calls(&mut self, raw_output: String, calls: Vec<ToolCall>) {
        self.push(raw_output, TurnAction::ToolCalls { calls });
    }

    /// Records an unparseable turn.
    pub fn record_malformed(&mut self, raw_output: String, reason: String) {
        self.malformed += 1;
        self.push(raw_output, TurnAction::Malformed { reason });
    }

    /// Records a failed backend call.
    pub fn record_backend_error(&mut self, message: String) {
        self.backend_failures += 1;
        self.push(String::new(), TurnAction::BackendError { message });
    }

    /// Adds token usage to the running total.
    pub fn add_token_usage(&mut self, usage: &TokenUsage) {
        self.trajectory.token_usage.add(usage);
    }

    /// Number of turns recorded so far.
    pub fn turn_count(&self) -> usize {
        self.trajectory.turns.len()
    }

    /// Malformed plus failed-backend turns so far.
    pub fn failed_turns(&self) -> usize {
        self.malformed + self.backend_failures
    }

    /// Returns the trajectory ID.
    pub fn trajectory_id(&self) -> Uuid {
        self.trajectory.id
    }

    /// Finalizes and returns the trajectory.
    pub fn finalize(mut self, terminal: TerminalState, duration_ms: u64) -> Trajectory {
        self.trajectory.terminal = terminal;
        self.trajectory.duration_ms = duration_ms;
        self.trajectory
    }
}
