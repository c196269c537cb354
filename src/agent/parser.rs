//! Parsing backend output into agent actions.
//!
//! Backend output is untrusted. Native tool calls are preferred when the
//! response carries them; otherwise the text is scanned for JSON in any of
//! these shapes:
//!
//! ```text
//! {"final_answer": "..."}
//! {"tool": "name", "args": {...}}            // also "arguments"
//! {"name": "name", "parameters": {...}}      // also "arguments" / "args" / "input"; required
//! {"function": {"name": "name", "arguments": "{...}"}}
//! {"tool_calls": [ ...any call shape... ]}
//! [ ...any call shape... ]
//! ```
//!
//! Anything else is malformed, unless plain-text answers are enabled.

use serde_json::{Map, Value};

use crate::llm::Message;
use crate::utils::json_extraction::{analyze_json_structure, find_json_values};

/// A tool call requested by the agent, before it reaches the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub name: String,
    pub arguments: Value,
}

/// What one backend turn asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    FinalAnswer(String),
    ToolCalls(Vec<ParsedCall>),
    Malformed(String),
}

/// Trait for parsing agent actions from backend responses.
pub trait OutputParser: Send + Sync {
    fn parse(&self, message: &Message) -> ParsedOutput;
}

/// Default parser for JSON tool calls and answers.
#[derive(Debug, Clone, Default)]
pub struct JsonOutputParser {
    accept_plain_text: bool,
}

impl JsonOutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat output with no JSON at all as a final answer.
    pub fn with_plain_text_answers(mut self, accept: bool) -> Self {
        self.accept_plain_text = accept;
        self
    }

    fn parse_text(&self, content: &str) -> ParsedOutput {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return ParsedOutput::Malformed("empty output".to_string());
        }

        let values = find_json_values(trimmed);
        let mut calls = Vec::new();
        let mut answer = None;

        for value in &values {
            match value {
                Value::Object(obj) if obj.contains_key("final_answer") => {
                    if answer.is_none() {
                        answer = render_answer(&obj["final_answer"]);
                    }
                }
                Value::Object(obj) if obj.contains_key("tool_calls") => {
                    if let Some(items) = obj["tool_calls"].as_array() {
                        calls.extend(items.iter().filter_map(call_from_value));
                    }
                }
                Value::Array(items) => calls.extend(items.iter().filter_map(call_from_value)),
                other => calls.extend(call_from_value(other)),
            }
        }

        if !calls.is_empty() {
            return ParsedOutput::ToolCalls(calls);
        }
        if let Some(answer) = answer {
            return ParsedOutput::FinalAnswer(answer);
        }

        if !values.is_empty() {
            return ParsedOutput::Malformed(
                "JSON contains neither a tool call nor a final answer".to_string(),
            );
        }
        let analysis = analyze_json_structure(trimmed);
        if analysis.json_start.is_some() && analysis.is_truncated() {
            return ParsedOutput::Malformed("JSON appears truncated".to_string());
        }
        if self.accept_plain_text {
            return ParsedOutput::FinalAnswer(trimmed.to_string());
        }
        ParsedOutput::Malformed("no tool call or final answer found".to_string())
    }
}

impl OutputParser for JsonOutputParser {
    fn parse(&self, message: &Message) -> ParsedOutput {
        if !message.tool_calls.is_empty() {
            let calls = message
                .tool_calls
                .iter()
                .map(|call| ParsedCall {
                    name: call.function.name.clone(),
                    arguments: parse_arguments(&Value::String(call.function.arguments.clone())),
                })
                .collect();
            return ParsedOutput::ToolCalls(calls);
        }
        self.parse_text(&message.content)
    }
}

fn render_answer(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Keys that carry call arguments, in lookup order.
const ARGUMENT_KEYS: [&str; 4] = ["arguments", "args", "parameters", "input"];

fn call_from_value(value: &Value) -> Option<ParsedCall> {
    let obj = value.as_object()?;

    if let Some(function) = obj.get("function").and_then(Value::as_object) {
        let name = function.get("name")?.as_str()?;
        return Some(ParsedCall {
            name: name.to_string(),
            arguments: function
                .get("arguments")
                .map(parse_arguments)
                .unwrap_or_else(empty_object),
        });
    }

    let raw_arguments = ARGUMENT_KEYS.iter().find_map(|key| obj.get(*key));

    // A bare `name` is only a call when arguments come with it; agents often
    // quote records such as `{"name": "Bob", "status": "active"}`.
    let name = match (obj.get("tool"), raw_arguments) {
        (Some(tool), _) => tool.as_str()?,
        (None, Some(_)) => obj.get("name")?.as_str()?,
        (None, None) => return None,
    };
    let arguments = raw_arguments
        .map(parse_arguments)
        .unwrap_or_else(empty_object);

    Some(ParsedCall {
        name: name.to_string(),
        arguments,
    })
}

/// Arguments may arrive JSON-encoded as a string; decode when possible.
///
/// Undecodable strings are kept as-is so the environment can reject them.
fn parse_arguments(value: &Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => empty_object(),
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::NativeToolCall;
    use serde_json::json;

    fn parse(text: &str) -> ParsedOutput {
        JsonOutputParser::new().parse(&Message::assistant(text))
    }

    #[test]
    fn test_tool_args_format() {
        let out = parse(r#"{"tool": "lookup_order", "args": {"id": "order_123"}}"#);
        assert_eq!(
            out,
            ParsedOutput::ToolCalls(vec![ParsedCall {
                name: "lookup_order".to_string(),
                arguments: json!({"id": "order_123"}),
            }])
        );
    }

    #[test]
    fn test_name_parameters_format() {
        let out = parse(r#"Calling {"name": "search", "parameters": {"q": "x"}}"#);
        match out {
            ParsedOutput::ToolCalls(calls) => {
                assert_eq!(calls[0].name, "search");
                assert_eq!(calls[0].arguments["q"], "x");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_code_block_format() {
        let out = parse("```json\n{\"tool\": \"search\", \"arguments\": {\"pattern\": \"fn main\"}}\n```");
        assert!(matches!(out, ParsedOutput::ToolCalls(ref c) if c[0].arguments["pattern"] == "fn main"));
    }

    #[test]
    fn test_multiple_calls() {
        let out = parse(r#"{"tool_calls": [{"tool": "a"}, {"tool": "b", "args": {"x": 1}}]}"#);
        match out {
            ParsedOutput::ToolCalls(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].arguments, json!({}));
            }
            other => panic!("unexpected {:?}", other),
        }

        let out = parse(r#"[{"tool": "a"}, {"tool": "b"}]"#);
        assert!(matches!(out, ParsedOutput::ToolCalls(ref c) if c.len() == 2));
    }

    #[test]
    fn test_final_answer() {
        assert_eq!(
            parse(r#"{"final_answer": "Your order shipped."}"#),
            ParsedOutput::FinalAnswer("Your order shipped.".to_string())
        );
    }

    #[test]
    fn test_tool_calls_take_precedence_over_answer() {
        let out = parse(r#"{"tool": "a"} {"final_answer": "done"}"#);
        assert!(matches!(out, ParsedOutput::ToolCalls(_)));
    }

    #[test]
    fn test_plain_text_is_malformed_by_default() {
        assert!(matches!(parse("The order shipped."), ParsedOutput::Malformed(_)));
        let lenient = JsonOutputParser::new().with_plain_text_answers(true);
        assert_eq!(
            lenient.parse(&Message::assistant("The order shipped.")),
            ParsedOutput::FinalAnswer("The order shipped.".to_string())
        );
    }

    #[test]
    fn test_unrecognized_json_and_truncation() {
        assert_eq!(
            parse(r#"{"thought": "hmm"}"#),
            ParsedOutput::Malformed("JSON contains neither a tool call nor a final answer".to_string())
        );
        assert_eq!(
            JsonOutputParser::new()
                .with_plain_text_answers(true)
                .parse(&Message::assistant(r#"{"tool": "a", "args": {"#)),
            ParsedOutput::Malformed("JSON appears truncated".to_string())
        );
        assert_eq!(parse("   "), ParsedOutput::Malformed("empty output".to_string()));
    }

    #[test]
    fn test_empty_final_answer_is_not_an_answer() {
        assert!(matches!(parse(r#"{"final_answer": ""}"#), ParsedOutput::Malformed(_)));
    }

    #[test]
    fn test_native_tool_calls_preferred() {
        let message = Message::assistant(r#"{"final_answer": "ignored"}"#).with_tool_calls(vec![
            NativeToolCall::new("c1", "lookup_order", &json!({"id": "order_123"})),
        ]);
        let out = JsonOutputParser::new().parse(&message);
        assert_eq!(
            out,
            ParsedOutput::ToolCalls(vec![ParsedCall {
                name: "lookup_order".to_string(),
                arguments: json!({"id": "order_123"}),
            }])
        );
    }

    #[test]
    fn test_undecodable_string_arguments_kept() {
        let out = parse(r#"{"tool": "a", "arguments": "not json"}"#);
        assert!(matches!(out, ParsedOutput::ToolCalls(ref c) if c[0].arguments == json!("not json")));
    }

    #[test]
    fn test_quoted_record_is_not_a_call() {
        let out = parse(
            r#"The record was {"name": "Bob", "status": "active"}. {"final_answer": "Bob is active"}"#,
        );
        assert_eq!(out, ParsedOutput::FinalAnswer("Bob is active".to_string()));

        let out = parse(r#"{"name": "Bob", "status": "active"}"#);
        assert!(matches!(out, ParsedOutput::Malformed(_)));
    }

    #[test]
    fn test_explicit_call_beats_answer() {
        let out = parse(r#"{"tool": "lookup_order", "args": {"id": "1"}} {"final_answer": "later"}"#);
        assert!(matches!(out, ParsedOutput::ToolCalls(ref c) if c[0].name == "lookup_order"));
    }

    #[test]
    fn test_openai_function_shape_in_text() {
        let out = parse(r#"{"function": {"name": "a", "arguments": "{\"k\": 2}"}}"#);
        assert!(matches!(out, ParsedOutput::ToolCalls(ref c) if c[0].arguments["k"] == 2));
    }
}
