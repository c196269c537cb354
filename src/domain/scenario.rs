//! Scenarios: single test cases presented to the agent.
//!
//! Scenarios are immutable. New scenarios are only ever appended to a
//! [`super::ScenarioCatalog`], never edited in place.

use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyLevel;

/// A single test case for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique identifier within the domain.
    pub id: String,
    /// Short description of what the scenario exercises.
    #[serde(default)]
    pub description: String,
    /// Initial user message sent to the agent.
    pub user_message: String,
    /// Difficulty tier.
    #[serde(default = "default_difficulty")]
    pub difficulty: DifficultyLevel,
    /// Tool names the agent is expected to call, in order.
    #[serde(default)]
    pub expected_tool_calls: Vec<String>,
    /// Predicates the trajectory must satisfy.
    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,
    /// Where the scenario came from.
    #[serde(default)]
    pub origin: ScenarioOrigin,
}

fn default_difficulty() -> DifficultyLevel {
    DifficultyLevel::Medium
}

impl Scenario {
    /// Creates a seed scenario with no expectations.
    pub fn new(
        id: impl Into<String>,
        user_message: impl Into<String>,
        difficulty: DifficultyLevel,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            user_message: user_message.into(),
            difficulty,
            expected_tool_calls: Vec::new(),
            success_criteria: Vec::new(),
            origin: ScenarioOrigin::Seed,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_expected_tool_calls<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_tool_calls = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_criterion(mut self, criterion: SuccessCriterion) -> Self {
        self.success_criteria.push(criterion);
        self
    }

    pub fn with_origin(mut self, origin: ScenarioOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Every tool name this scenario refers to, expected calls first.
    pub fn referenced_tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = self
            .expected_tool_calls
            .iter()
            .map(String::as_str)
            .collect();
        for criterion in &self.success_criteria {
            if let Some(tool) = criterion.referenced_tool() {
                if !tools.contains(&tool) {
                    tools.push(tool);
                }
            }
        }
        tools
    }

    /// Returns true if the scenario was synthesized by the generator.
    pub fn is_generated(&self) -> bool {
        matches!(self.origin, ScenarioOrigin::Generated { .. })
    }
}

/// Provenance of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioOrigin {
    /// Loaded from the domain description.
    #[default]
    Seed,
    /// Synthesized during a round to target a weakness.
    Generated { round: u32, target_weakness: String },
}

/// A structured predicate over a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessCriterion {
    /// The tool was called at least once.
    ToolCalled { tool: String },
    /// The tool was never called.
    ToolNotCalled { tool: String },
    /// Some successful tool response (optionally from one tool) contains the text.
    ResponseContains {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
        text: String,
    },
    /// The final answer contains the text.
    AnswerContains {
        text: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    /// The final answer matches the regular expression.
    AnswerMatches { pattern: String },
    /// The agent emitted a final answer.
    Completed,
    /// No tool call failed in the environment.
    NoToolErrors,
}

impl SuccessCriterion {
    /// Tool name the criterion refers to, if any.
    pub fn referenced_tool(&self) -> Option<&str> {
        match self {
            SuccessCriterion::ToolCalled { tool } | SuccessCriterion::ToolNotCalled { tool } => {
                Some(tool)
            }
            SuccessCriterion::ResponseContains { tool, .. } => tool.as_deref(),
            _ => None,
        }
    }

    /// One-line human readable form.
    pub fn describe(&self) -> String {
        match self {
            SuccessCriterion::ToolCalled { tool } => format!("calls {}", tool),
            SuccessCriterion::ToolNotCalled { tool } => format!("never calls {}", tool),
            SuccessCriterion::ResponseContains {
                tool: Some(tool),
                text,
            } => format!("{} response contains '{}'", tool, text),
            SuccessCriterion::ResponseContains { tool: None, text } => {
                format!("a tool response contains '{}'", text)
            }
            SuccessCriterion::AnswerContains { text, .. } => {
                format!("answer contains '{}'", text)
            }
            SuccessCriterion::AnswerMatches { pattern } => format!("answer matches /{}/", pattern),
            SuccessCriterion::Completed => "emits a final answer".to_string(),
            SuccessCriterion::NoToolErrors => "no tool call fails".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_defaults_from_yaml() {
        let yaml = r#"
id: order_status
user_message: Where is my order 123?
expected_tool_calls: [lookup_order]
success_criteria:
  - type: tool_called
    tool: lookup_order
  - type: answer_contains
    text: shipped
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.difficulty, DifficultyLevel::Medium);
        assert_eq!(scenario.origin, ScenarioOrigin::Seed);
        assert_eq!(scenario.success_criteria.len(), 2);
        assert_eq!(
            scenario.success_criteria[1],
            SuccessCriterion::AnswerContains {
                text: "shipped".to_string(),
                case_sensitive: false
            }
        );
    }

    #[test]
    fn test_referenced_tools_deduplicates() {
        let scenario = Scenario::new("s", "hi", DifficultyLevel::Easy)
            .with_expected_tool_calls(["a", "b"])
            .with_criterion(SuccessCriterion::ToolCalled {
                tool: "a".to_string(),
            })
            .with_criterion(SuccessCriterion::ResponseContains {
                tool: Some("c".to_string()),
                text: "ok".to_string(),
            });
        assert_eq!(scenario.referenced_tools(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_generated_origin_serialization() {
        let origin = ScenarioOrigin::Generated {
            round: 2,
            target_weakness: "tool_selection".to_string(),
        };
        let json = serde_json::to_value(&origin).unwrap();
        assert_eq!(json["kind"], "generated");
        assert_eq!(json["round"], 2);
    }

    #[test]
    fn test_criterion_describe() {
        let c = SuccessCriterion::AnswerMatches {
            pattern: "\\d+".to_string(),
        };
        assert_eq!(c.describe(), "answer matches /\\d+/");
        assert_eq!(SuccessCriterion::Completed.describe(), "emits a final answer");
    }
}
