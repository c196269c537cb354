//! Structural validation for scenarios.
//!
//! Used both at domain load time (where any error is fatal) and on generator
//! drafts (where invalid drafts are dropped).

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Scenario, SuccessCriterion};
use crate::environment::SimulationEnvironment;

/// Result of validating a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaValidationResult {
    /// Whether the scenario passes all required validations.
    pub valid: bool,
    /// Errors that make the scenario unusable.
    pub errors: Vec<SchemaError>,
    /// Non-blocking remarks.
    pub warnings: Vec<String>,
}

impl SchemaValidationResult {
    /// Create a new valid result with no errors or warnings.
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error to the result.
    pub fn add_error(
        &mut self,
        field: impl Into<String>,
        kind: SchemaErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(SchemaError {
            field: field.into(),
            message: message.into(),
            kind,
        });
        self.valid = false;
    }

    /// Add a warning to the result.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// First unknown tool reported, if any.
    pub fn unknown_tool(&self) -> Option<&str> {
        self.errors.iter().find_map(|e| match &e.kind {
            SchemaErrorKind::UnknownTool { tool } => Some(tool.as_str()),
            _ => None,
        })
    }

    /// Error messages prefixed with their field.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect()
    }
}

/// A single validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaError {
    /// Field that failed validation.
    pub field: String,
    /// Description of the validation error.
    pub message: String,
    /// Category of the failure.
    pub kind: SchemaErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaErrorKind {
    MissingField,
    InvalidFormat,
    UnknownTool { tool: String },
    InvalidPattern,
}

/// Validates scenarios against a fixed set of tool names.
#[derive(Debug, Clone)]
pub struct ScenarioValidator {
    known_tools: BTreeSet<String>,
}

impl ScenarioValidator {
    pub fn new<I, S>(known_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_tools: known_tools.into_iter().map(Into::into).collect(),
        }
    }

    /// Validator for the tools of an environment.
    pub fn for_environment(environment: &SimulationEnvironment) -> Self {
        Self::new(environment.tool_names())
    }

    /// Validate a scenario.
    ///
    /// Checks:
    /// - id format (alphanumeric with hyphens and underscores)
    /// - non-empty user message
    /// - every referenced tool exists
    /// - criterion texts are non-empty and regexes compile
    ///
    /// A scenario with neither expected calls nor criteria is only warned about.
    pub fn validate(&self, scenario: &Scenario) -> SchemaValidationResult {
        let mut result = SchemaValidationResult::valid();

        if !is_valid_id(&scenario.id) {
            result.add_error(
                "id",
                SchemaErrorKind::InvalidFormat,
                "ID must be alphanumeric with hyphens and underscores (e.g., 'order-status-01')",
            );
        }

        if scenario.user_message.trim().is_empty() {
            result.add_error(
                "user_message",
                SchemaErrorKind::MissingField,
                "user_message cannot be empty",
            );
        }

        if scenario.description.trim().is_empty() {
            result.add_warning(format!("Scenario '{}' has no description", scenario.id));
        }

        for tool in scenario.referenced_tools() {
            if !self.known_tools.contains(tool) {
                result.add_error(
                    "tools",
                    SchemaErrorKind::UnknownTool {
                        tool: tool.to_string(),
                    },
                    format!("Unknown tool '{}'", tool),
                );
            }
        }

        for (i, criterion) in scenario.success_criteria.iter().enumerate() {
            let field = format!("success_criteria[{}]", i);
            match criterion {
                SuccessCriterion::ResponseContains { text, .. }
                | SuccessCriterion::AnswerContains { text, .. }
                    if text.trim().is_empty() =>
                {
                    result.add_error(field, SchemaErrorKind::MissingField, "text cannot be empty");
                }
                SuccessCriterion::AnswerMatches { pattern } => {
                    if let Err(e) = Regex::new(pattern) {
                        result.add_error(
                            field,
                            SchemaErrorKind::InvalidPattern,
                            format!("Invalid regex '{}': {}", pattern, e),
                        );
                    }
                }
                _ => {}
            }
        }

        if scenario.expected_tool_calls.is_empty() && scenario.success_criteria.is_empty() {
            result.add_warning(format!(
                "Scenario '{}' has no expected tool calls or success criteria",
                scenario.id
            ));
        }

        result
    }
}

/// Check if an ID string is valid (alphanumeric with hyphens and underscores).
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
