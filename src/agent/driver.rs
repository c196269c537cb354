//! Multi-turn tool-call driver.
//!
//! Each turn sends the conversation to the backend, parses the output, and
//! either ends the run (final answer), answers tool calls from the
//! environment, or records a malformed turn. [`AgentDriver::run`] never
//! fails: every way a run can go wrong ends up in the trajectory's terminal
//! state.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::parser::{JsonOutputParser, OutputParser, ParsedOutput};
use super::prompts::{build_correction_prompt, build_system_prompt, render_tool_results};
use crate::domain::Scenario;
use crate::environment::SimulationEnvironment;
use crate::error::ConfigError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::trajectory::{
    TerminalState, TokenUsage, ToolCall, Trajectory, TrajectoryCollector, TruncationReason,
};

/// Configuration for the agent driver.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of backend turns per run.
    pub max_turns: u32,
    /// Failed turns (malformed or backend errors) allowed before the run is cut.
    pub malformed_tolerance: u32,
    /// Model to use for backend requests.
    pub model: String,
    /// Temperature for sampling.
    pub temperature: f64,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Treat non-JSON output as a final answer.
    pub accept_plain_text_answers: bool,
    /// Offer the tool schema for native function calling.
    pub native_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            malformed_tolerance: 3,
            model: String::new(), // Use the provider's default
            temperature: 0.2,
            max_tokens: 1024,
            accept_plain_text_answers: false,
            native_tools: false,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_malformed_tolerance(mut self, tolerance: u32) -> Self {
        self.malformed_tolerance = tolerance;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_plain_text_answers(mut self, accept: bool) -> Self {
        self.accept_plain_text_answers = accept;
        self
    }

    pub fn with_native_tools(mut self, native_tools: bool) -> Self {
        self.native_tools = native_tools;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_turns must be greater than 0".to_string(),
            ));
        }
        if self.malformed_tolerance == 0 {
            return Err(ConfigError::ValidationFailed(
                "malformed_tolerance must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Drives one agent run per scenario.
pub struct AgentDriver {
    backend: Arc<dyn LlmProvider>,
    parser: Box<dyn OutputParser>,
    config: AgentConfig,
}

impl std::fmt::Debug for AgentDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AgentDriver {
    pub fn new(backend: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        let parser = JsonOutputParser::new().with_plain_text_answers(config.accept_plain_text_answers);
        Self {
            backend,
            parser: Box::new(parser),
            config,
        }
    }

    /// Set a custom output parser.
    pub fn with_parser(mut self, parser: Box<dyn OutputParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Runs the agent on a scenario and returns the trajectory.
    pub async fn run(&self, scenario: &Scenario, environment: &SimulationEnvironment) -> Trajectory {
        let started = Instant::now();
        let mut collector = TrajectoryCollector::new(&scenario.id, &self.config.model);
        let mut conversation = vec![
            Message::system(build_system_prompt(environment)),
            Message::user(scenario.user_message.clone()),
        ];
        let tools = self.config.native_tools.then(|| environment.tool_schema());
        let tolerance = self.config.malformed_tolerance as usize;

        let finish = |collector: TrajectoryCollector, terminal: TerminalState| {
            let trajectory = collector.finalize(terminal, started.elapsed().as_millis() as u64);
            debug!(
                scenario_id = %trajectory.scenario_id,
                turns = trajectory.turns.len(),
                terminal = %trajectory.terminal,
                "Agent run finished"
            );
            trajectory
        };

        for turn in 0..self.config.max_turns {
            let mut request = GenerationRequest::new(self.config.model.clone(), conversation.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_tokens);
            if let Some(ref tools) = tools {
                request = request.with_tools(tools.clone());
            }

            let response = match self.backend.generate(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(scenario_id = %scenario.id, turn, error = %e, "Backend call failed");
                    collector.record_backend_error(e.to_string());
                    if collector.failed_turns() >= tolerance {
                        return finish(
                            collector,
                            TerminalState::Truncated {
                                reason: TruncationReason::BackendFailure,
                            },
                        );
                    }
                    continue;
                }
            };
            collector.add_token_usage(&TokenUsage::from(&response.usage));

            let parsed = match response.first_message() {
                Some(message) => (render_raw(message), self.parser.parse(message)),
                None => (
                    String::new(),
                    ParsedOutput::Malformed("response has no choices".to_string()),
                ),
            };

            match parsed {
                (raw, ParsedOutput::FinalAnswer(answer)) => {
                    collector.record_final_answer(raw, answer);
                    return finish(collector, TerminalState::Completed);
                }
                (raw, ParsedOutput::ToolCalls(calls)) => {
                    let executed: Vec<ToolCall> = calls
                        .into_iter()
                        .map(|call| {
                            let result = environment.invoke(&call.name, &call.arguments);
                            if let Err(ref e) = result {
                                debug!(scenario_id = %scenario.id, tool = %call.name, error = %e, "Tool call failed");
                            }
                            ToolCall::from_result(call.name, call.arguments, result)
                        })
                        .collect();
                    conversation.push(Message::assistant(raw.clone()));
                    conversation.push(Message::user(render_tool_results(&executed)));
                    collector.record_tool_calls(raw, executed);
                }
                (raw, ParsedOutput::Malformed(reason)) => {
                    warn!(scenario_id = %scenario.id, turn, reason = %reason, "Malformed agent output");
                    collector.record_malformed(raw.clone(), reason.clone());
                    if collector.failed_turns() >= tolerance {
                        return finish(
                            collector,
                            TerminalState::Truncated {
                                reason: TruncationReason::MalformedOutput,
                            },
                        );
                    }
                    conversation.push(Message::assistant(raw));
                    conversation.push(Message::user(build_correction_prompt(&reason)));
                }
            }
        }

        finish(
            collector,
            TerminalState::Truncated {
                reason: TruncationReason::TurnLimit,
            },
        )
    }
}

/// Text form of a backend message; native calls are rendered as JSON.
fn render_raw(message: &Message) -> String {
    if message.tool_calls.is_empty() {
        return message.content.clone();
    }
    let calls: Vec<serde_json::Value> = message
        .tool_calls
        .iter()
        .map(|c| serde_json::json!({"tool": c.function.name, "arguments": c.function.arguments}))
        .collect();
    let rendered = serde_json::json!({ "tool_calls": calls }).to_string();
    if message.content.trim().is_empty() {
        rendered
    } else {
        format!("{}\n{}", message.content, rendered)
    }
}
