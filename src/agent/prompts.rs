//! Prompts for the agent under training.

use crate::environment::SimulationEnvironment;
use crate::trajectory::ToolCall;

/// System prompt for the agent. `{tools}` is replaced with the tool listing.
pub const AGENT_SYSTEM_PROMPT: &str = r#"You are a helpful agent that completes user requests by calling tools.

## Available Tools

{tools}
## Response Format

To call a tool, respond with JSON only:
{"tool": "tool_name", "args": {"key": "value"}}

To call several tools in one turn:
{"tool_calls": [{"tool": "first", "args": {}}, {"tool": "second", "args": {}}]}

When you have the final answer, respond with:
{"final_answer": "your answer"}

## Guidelines

1. Use tools to look up facts instead of guessing.
2. Read each tool result before deciding the next step.
3. If a tool returns an error, correct the call or choose another tool.
4. Always respond with valid JSON only.
"#;

/// Sent after a turn that could not be parsed.
pub const CORRECTION_PROMPT: &str = "Your last response could not be understood ({reason}). \
Respond with JSON only: either {\"tool\": \"tool_name\", \"args\": {...}} or {\"final_answer\": \"...\"}.";

/// Build the system prompt for an environment.
pub fn build_system_prompt(environment: &SimulationEnvironment) -> String {
    AGENT_SYSTEM_PROMPT.replace("{tools}", &environment.describe_tools())
}

/// Build the correction message for a malformed turn.
pub fn build_correction_prompt(reason: &str) -> String {
    CORRECTION_PROMPT.replace("{reason}", reason)
}

/// Render tool results as the next user message.
pub fn render_tool_results(calls: &[ToolCall]) -> String {
    calls
        .iter()
        .map(|call| format!("Tool result ({}): {}", call.name, call.outcome.render()))
        .collect::<Vec<_>>()
        .join("\n")
}
