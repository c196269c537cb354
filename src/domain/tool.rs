//! Tool specifications and their mock-response tables.
//!
//! A tool is immutable once loaded. Its mock table maps argument patterns to
//! pre-authored responses:
//!
//! ```yaml
//! name: lookup_order
//! description: Look up an order by id
//! parameters:
//!   id: { type: string, description: Order identifier }
//! mock_responses:
//!   order_123: { status: shipped }                  # single-value shorthand
//!   '{"id": "order_456"}': { status: pending }      # exact argument object
//!   default: { status: unknown }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved mock-table key for the fallback response.
pub const DEFAULT_MOCK_KEY: &str = "default";

/// Description of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawParameter")]
pub struct ParameterSpec {
    /// JSON type name (e.g. "string", "integer").
    #[serde(rename = "type")]
    pub param_type: String,
    /// Human-readable description shown to the agent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Accepts both `id: string` and `id: { type: string, description: ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawParameter {
    Type(String),
    Full {
        #[serde(rename = "type")]
        param_type: String,
        #[serde(default)]
        description: String,
    },
}

impl From<RawParameter> for ParameterSpec {
    fn from(raw: RawParameter) -> Self {
        match raw {
            RawParameter::Type(param_type) => Self {
                param_type,
                description: String::new(),
            },
            RawParameter::Full {
                param_type,
                description,
            } => Self {
                param_type,
                description,
            },
        }
    }
}

/// A simulated tool available to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique name within the domain.
    pub name: String,
    /// Description shown to the agent.
    #[serde(default)]
    pub description: String,
    /// Parameter name -> specification.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    /// Argument pattern -> mock response.
    #[serde(default)]
    pub mock_responses: MockTable,
}

impl ToolSpec {
    /// Creates a tool with no parameters and an empty mock table.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
            mock_responses: MockTable::default(),
        }
    }

    /// Adds a parameter.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.insert(
            name.into(),
            ParameterSpec {
                param_type: param_type.into(),
                description: description.into(),
            },
        );
        self
    }

    /// Replaces the mock table.
    pub fn with_mock_responses(mut self, mock_responses: MockTable) -> Self {
        self.mock_responses = mock_responses;
        self
    }

    /// JSON schema of the parameters, in function-calling format.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(name, spec)| {
                let mut prop = Map::new();
                prop.insert("type".to_string(), Value::String(spec.param_type.clone()));
                if !spec.description.is_empty() {
                    prop.insert(
                        "description".to_string(),
                        Value::String(spec.description.clone()),
                    );
                }
                (name.clone(), Value::Object(prop))
            })
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
        })
    }
}

/// How a mock-table key is matched against call arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentPattern {
    /// Key was a JSON object: arguments must equal it exactly (key order is irrelevant).
    Exact(Map<String, Value>),
    /// Any other key: arguments must hold exactly one value rendering to this string.
    SingleValue(String),
}

impl ArgumentPattern {
    /// Parses a mock-table key.
    pub fn parse(key: &str) -> Result<Self, String> {
        let trimmed = key.trim();
        if trimmed.starts_with('{') {
            return match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => Ok(ArgumentPattern::Exact(map)),
                Ok(_) => Err(format!("pattern '{}' is not a JSON object", key)),
                Err(e) => Err(format!("pattern '{}' is not valid JSON: {}", key, e)),
            };
        }
        Ok(ArgumentPattern::SingleValue(key.to_string()))
    }

    /// Case-sensitive match against concrete arguments.
    pub fn matches(&self, arguments: &Map<String, Value>) -> bool {
        match self {
            ArgumentPattern::Exact(expected) => expected == arguments,
            ArgumentPattern::SingleValue(expected) => {
                if arguments.len() != 1 {
                    return false;
                }
                arguments
                    .values()
                    .next()
                    .and_then(render_scalar)
                    .is_some_and(|rendered| rendered == *expected)
            }
        }
    }

    fn is_exact(&self) -> bool {
        matches!(self, ArgumentPattern::Exact(_))
    }
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MockEntry {
    key: String,
    pattern: ArgumentPattern,
    response: Value,
}

/// Mapping from argument pattern to mock response, with an optional default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Value>",
    into = "BTreeMap<String, Value>"
)]
pub struct MockTable {
    entries: Vec<MockEntry>,
    default: Option<Value>,
}

impl MockTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry. The `default` key sets the fallback response.
    pub fn with_entry(mut self, key: impl Into<String>, response: Value) -> Result<Self, String> {
        self.insert(key.into(), response)?;
        Ok(self)
    }

    fn insert(&mut self, key: String, response: Value) -> Result<(), String> {
        if key == DEFAULT_MOCK_KEY {
            self.default = Some(response);
            return Ok(());
        }
        let pattern = ArgumentPattern::parse(&key)?;
        self.entries.retain(|e| e.key != key);
        self.entries.push(MockEntry {
            key,
            pattern,
            response,
        });
        self.entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(())
    }

    /// Finds the response for the given arguments.
    ///
    /// Exact object patterns are tried first, then single-value patterns,
    /// then the default entry.
    pub fn lookup(&self, arguments: &Map<String, Value>) -> Option<&Value> {
        self.entries
            .iter()
            .filter(|e| e.pattern.is_exact())
            .chain(self.entries.iter().filter(|e| !e.pattern.is_exact()))
            .find(|e| e.pattern.matches(arguments))
            .map(|e| &e.response)
            .or(self.default.as_ref())
    }

    /// Returns true if a `default` entry exists.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Number of entries, including the default.
    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.default.is_some())
    }

    /// Returns true if the table has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TryFrom<BTreeMap<String, Value>> for MockTable {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        let mut table = MockTable::new();
        for (key, response) in raw {
            table.insert(key, response)?;
        }
        Ok(table)
    }
}

impl From<MockTable> for BTreeMap<String, Value> {
    fn from(table: MockTable) -> Self {
        let mut raw: BTreeMap<String, Value> = table
            .entries
            .into_iter()
            .map(|e| (e.key, e.response))
            .collect();
        if let Some(default) = table.default {
            raw.insert(DEFAULT_MOCK_KEY.to_string(), default);
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_single_value_pattern() {
        let pattern = ArgumentPattern::parse("order_123").unwrap();
        assert!(pattern.matches(&args(json!({"id": "order_123"}))));
        assert!(!pattern.matches(&args(json!({"id": "ORDER_123"}))));
        assert!(!pattern.matches(&args(json!({"id": "order_123", "x": 1}))));
    }

    #[test]
    fn test_single_value_pattern_renders_numbers() {
        let pattern = ArgumentPattern::parse("42").unwrap();
        assert!(pattern.matches(&args(json!({"qty": 42}))));
    }

    #[test]
    fn test_exact_pattern_ignores_key_order() {
        let pattern = ArgumentPattern::parse(r#"{"a": 1, "b": "x"}"#).unwrap();
        assert!(pattern.matches(&args(json!({"b": "x", "a": 1}))));
        assert!(!pattern.matches(&args(json!({"a": 1}))));
    }

    #[test]
    fn test_invalid_object_pattern() {
        assert!(ArgumentPattern::parse("{not json").is_err());
    }

    #[test]
    fn test_lookup_prefers_exact_over_shorthand() {
        let table = MockTable::new()
            .with_entry("order_1", json!({"from": "shorthand"}))
            .unwrap()
            .with_entry(r#"{"id": "order_1"}"#, json!({"from": "exact"}))
            .unwrap();
        let response = table.lookup(&args(json!({"id": "order_1"}))).unwrap();
        assert_eq!(response["from"], "exact");
    }

    #[test]
    fn test_lookup_falls_back_to_default() {
        let table = MockTable::new()
            .with_entry("order_123", json!({"status": "shipped"}))
            .unwrap()
            .with_entry("default", json!({"status": "unknown"}))
            .unwrap();
        assert!(table.has_default());
        assert_eq!(table.len(), 2);
        let response = table.lookup(&args(json!({"id": "order_999"}))).unwrap();
        assert_eq!(response, &json!({"status": "unknown"}));
    }

    #[test]
    fn test_lookup_without_default_misses() {
        let table = MockTable::new()
            .with_entry("order_123", json!({"status": "shipped"}))
            .unwrap();
        assert!(table.lookup(&args(json!({"id": "nope"}))).is_none());
    }

    #[test]
    fn test_mock_table_from_yaml() {
        let yaml = r#"
order_123: { status: shipped }
'{"id": "order_456", "verbose": true}': { status: pending }
default: { status: unknown }
"#;
        let table: MockTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.len(), 3);
        let hit = table
            .lookup(&args(json!({"verbose": true, "id": "order_456"})))
            .unwrap();
        assert_eq!(hit["status"], "pending");
    }

    #[test]
    fn test_parameter_spec_short_and_long_forms() {
        let yaml = r#"
name: lookup_order
parameters:
  id: string
  verbose: { type: boolean, description: Include history }
"#;
        let tool: ToolSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tool.parameters["id"].param_type, "string");
        assert_eq!(tool.parameters["verbose"].description, "Include history");

        let schema = tool.parameters_schema();
        assert_eq!(schema["properties"]["verbose"]["type"], "boolean");
    }
}
