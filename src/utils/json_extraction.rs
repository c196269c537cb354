//! JSON extraction utilities for parsing LLM responses.
//!
//! Backend output frequently wraps JSON in markdown fences or surrounds it
//! with prose. The extraction functions try, in order:
//! 1. JSON in a markdown code block (```json or bare ```)
//! 2. Direct JSON (content starts with '{' or '[')
//! 3. The first complete JSON object or array anywhere in the content
//!
//! # Example
//!
//! ```
//! use agent_forge::utils::json_extraction::extract_json_from_response;
//!
//! let response = "Here is the result: {\"name\": \"example\", \"value\": 42}";
//! let json = extract_json_from_response(response);
//! assert!(json.contains("example"));
//! ```

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Result of JSON extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtractionResult {
    /// Successfully extracted valid JSON
    Success(String),
    /// JSON appears to be truncated (started but didn't complete)
    Truncated {
        partial_json: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    /// No JSON-like content found in response
    NotFound,
}

impl JsonExtractionResult {
    /// Returns true if JSON was successfully extracted
    pub fn is_success(&self) -> bool {
        matches!(self, JsonExtractionResult::Success(_))
    }

    /// Returns true if JSON appears to be truncated
    pub fn is_truncated(&self) -> bool {
        matches!(self, JsonExtractionResult::Truncated { .. })
    }

    /// Returns the extracted JSON string for the Success case
    pub fn json(&self) -> Option<&str> {
        match self {
            JsonExtractionResult::Success(json) => Some(json),
            _ => None,
        }
    }

    /// Converts the result to a Result, including a content preview for NotFound
    pub fn into_result_with_context(self, content: &str) -> Result<String, JsonExtractionError> {
        match self {
            JsonExtractionResult::Success(json) => Ok(json),
            JsonExtractionResult::Truncated {
                partial_json,
                unclosed_braces,
                unclosed_brackets,
            } => Err(JsonExtractionError::Truncated {
                partial_preview: preview(&partial_json, 100),
                unclosed_braces,
                unclosed_brackets,
            }),
            JsonExtractionResult::NotFound => Err(JsonExtractionError::NotFound {
                content_preview: preview(content.trim(), 50),
            }),
        }
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Analysis result for JSON structure
#[derive(Debug, Clone, PartialEq)]
pub struct JsonStructureAnalysis {
    /// Number of unclosed braces ('{' without matching '}')
    pub unclosed_braces: usize,
    /// Number of unclosed brackets ('[' without matching ']')
    pub unclosed_brackets: usize,
    /// Whether we ended inside a string literal
    pub in_string: bool,
    /// The position where JSON-like content starts (first '{' or '[')
    pub json_start: Option<usize>,
}

impl JsonStructureAnalysis {
    pub fn is_truncated(&self) -> bool {
        self.unclosed_braces > 0 || self.unclosed_brackets > 0 || self.in_string
    }
}

/// Scans the content and tracks brace/bracket depth to detect incomplete JSON.
pub fn analyze_json_structure(s: &str) -> JsonStructureAnalysis {
    let mut brace_depth: isize = 0;
    let mut bracket_depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut json_start: Option<usize> = None;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' if json_start.is_some() => in_string = !in_string,
            '{' if !in_string => {
                json_start.get_or_insert(i);
                brace_depth += 1;
            }
            '}' if !in_string => brace_depth -= 1,
            '[' if !in_string => {
                json_start.get_or_insert(i);
                bracket_depth += 1;
            }
            ']' if !in_string => bracket_depth -= 1,
            _ => {}
        }
    }

    JsonStructureAnalysis {
        unclosed_braces: brace_depth.max(0) as usize,
        unclosed_brackets: bracket_depth.max(0) as usize,
        in_string,
        json_start,
    }
}

/// Attempts to extract JSON from an LLM response with detailed result information.
pub fn try_extract_json_from_response(content: &str) -> JsonExtractionResult {
    let trimmed = content.trim();

    if let Some(json) = extract_from_code_block(trimmed) {
        if is_valid_json(&json) {
            return JsonExtractionResult::Success(json);
        }
    }

    if let Some(start) = trimmed.find(['{', '[']) {
        let candidate = &trimmed[start..];
        if let Some(end) = find_matching_close(candidate) {
            let json = &candidate[..=end];
            if is_valid_json(json) {
                return JsonExtractionResult::Success(json.to_string());
            }
        }
    }

    if let Some(value) = find_json_values(trimmed).into_iter().next() {
        return JsonExtractionResult::Success(value.to_string());
    }

    let analysis = analyze_json_structure(trimmed);
    if let Some(start) = analysis.json_start {
        if analysis.is_truncated() {
            return JsonExtractionResult::Truncated {
                partial_json: trimmed[start..].to_string(),
                unclosed_braces: analysis.unclosed_braces,
                unclosed_brackets: analysis.unclosed_brackets,
            };
        }
    }

    JsonExtractionResult::NotFound
}

/// Extracts JSON content, or returns the trimmed input if none was found.
pub fn extract_json_from_response(content: &str) -> String {
    match try_extract_json_from_response(content) {
        JsonExtractionResult::Success(json) => json,
        JsonExtractionResult::Truncated { partial_json, .. } => partial_json,
        JsonExtractionResult::NotFound => content.trim().to_string(),
    }
}

/// Finds the index of the bracket closing the one `s` starts with.
///
/// Handles nesting, string literals, and escape sequences.
pub fn find_matching_close(s: &str) -> Option<usize> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract the body of the first ```json (or bare ```) code block.
pub fn extract_from_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?:json|JSON)?[ \t]*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let body = caps.get(1)?.as_str().trim();
    let start = body.find(['{', '['])?;
    let candidate = &body[start..];
    match find_matching_close(candidate) {
        Some(end) => Some(candidate[..=end].to_string()),
        None => Some(candidate.to_string()),
    }
}

/// Every complete top-level JSON object or array in the content, in order.
///
/// Text between values is skipped, so prose interleaved with several JSON
/// snippets yields each snippet.
pub fn find_json_values(content: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut offset = 0;

    while let Some(rel) = content[offset..].find(['{', '[']) {
        let start = offset + rel;
        let candidate = &content[start..];
        match find_matching_close(candidate) {
            Some(end) => match serde_json::from_str::<Value>(&candidate[..=end]) {
                Ok(value) => {
                    values.push(value);
                    offset = start + end + 1;
                }
                Err(_) => offset = start + 1,
            },
            None => offset = start + 1,
        }
    }

    values
}

fn is_valid_json(s: &str) -> bool {
    serde_json::from_str::<Value>(s).is_ok()
}
