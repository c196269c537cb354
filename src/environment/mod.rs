//! Simulated tool environment.
//!
//! Tool calls never touch the outside world: each invocation is answered from
//! the tool's mock table. Invocation is pure and the environment can be shared
//! across concurrent agent runs.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::ToolSpec;
use crate::error::{DomainError, EnvironmentError};

/// The fixed set of simulated tools available to the agent.
#[derive(Debug, Clone)]
pub struct SimulationEnvironment {
    tools: BTreeMap<String, ToolSpec>,
}

impl SimulationEnvironment {
    /// Builds an environment, failing on duplicate tool names.
    pub fn new(tools: Vec<ToolSpec>) -> Result<Self, DomainError> {
        let mut map = BTreeMap::new();
        for tool in tools {
            if map.contains_key(&tool.name) {
                return Err(DomainError::DuplicateTool(tool.name));
            }
            map.insert(tool.name.clone(), tool);
        }
        Ok(Self { tools: map })
    }

    /// Answers a tool call from the mock table.
    ///
    /// `null` arguments are treated as an empty object.
    pub fn invoke(&self, name: &str, arguments: &Value) -> Result<Value, EnvironmentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| EnvironmentError::UnknownTool {
                name: name.to_string(),
            })?;

        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(EnvironmentError::InvalidArguments {
                    tool: name.to_string(),
                    reason: format!("expected a JSON object, got {}", json_type_name(other)),
                })
            }
        };

        tool.mock_responses
            .lookup(args)
            .cloned()
            .ok_or_else(|| EnvironmentError::NoMockResponse {
                tool: name.to_string(),
                arguments: Value::Object(args.clone()).to_string(),
            })
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in sorted order.
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in OpenAI function-calling format.
    pub fn tool_schema(&self) -> Value {
        Value::Array(
            self.tools
                .values()
                .map(|tool| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters_schema(),
                        }
                    })
                })
                .collect(),
        )
    }

    /// Plain-text tool listing for prompts.
    pub fn describe_tools(&self) -> String {
        let mut out = String::new();
        for tool in self.tools.values() {
            out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            for (param, spec) in &tool.parameters {
                if spec.description.is_empty() {
                    out.push_str(&format!("    {} ({})\n", param, spec.param_type));
                } else {
                    out.push_str(&format!(
                        "    {} ({}): {}\n",
                        param, spec.param_type, spec.description
                    ));
                }
            }
        }
        out
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
