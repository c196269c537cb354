//! Scripted provider that replays canned responses.
//!
//! Used for offline runs (`--replay <file>`) and throughout the test suite.
//! Responses are served in order; once the script runs out the optional
//! fallback is repeated, otherwise [`LlmError::ReplayExhausted`] is returned.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::litellm::{
    Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, NativeToolCall, Usage,
};
use crate::error::LlmError;

/// One scripted backend reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayStep {
    /// Plain text content.
    Content { text: String },
    /// Native tool calls with empty content.
    ToolCalls { calls: Vec<NativeToolCall> },
    /// The backend call fails.
    Failure { message: String },
}

impl ReplayStep {
    pub fn content(text: impl Into<String>) -> Self {
        ReplayStep::Content { text: text.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ReplayStep::Failure {
            message: message.into(),
        }
    }
}

/// An [`LlmProvider`] answering from a script.
pub struct ReplayProvider {
    steps: Mutex<VecDeque<ReplayStep>>,
    fallback: Option<ReplayStep>,
    served: Mutex<usize>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl std::fmt::Debug for ReplayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayProvider")
            .field("remaining", &self.remaining())
            .field("has_fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl ReplayProvider {
    pub fn new(steps: impl IntoIterator<Item = ReplayStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            fallback: None,
            served: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script of plain-text responses.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(ReplayStep::content))
    }

    /// A provider that always answers with the same text.
    pub fn repeating(text: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(ReplayStep::content(text))
    }

    /// Reads a script from a JSON file holding an array of steps.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LlmError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LlmError::RequestFailed(format!("Failed to read replay file: {}", e)))?;
        let steps: Vec<ReplayStep> = serde_json::from_str(&content)
            .map_err(|e| LlmError::ParseError(format!("Invalid replay file: {}", e)))?;
        Ok(Self::new(steps))
    }

    /// Step repeated once the script is exhausted.
    pub fn with_fallback(mut self, step: ReplayStep) -> Self {
        self.fallback = Some(step);
        self
    }

    /// Number of scripted steps not yet served.
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Copies of every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_step(&self) -> Result<ReplayStep, LlmError> {
        let mut served = self.served.lock().unwrap_or_else(|e| e.into_inner());
        let next = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(step) => {
                *served += 1;
                Ok(step)
            }
            None => Err(LlmError::ReplayExhausted(*served)),
        }
    }
}

#[async_trait]
impl LlmProvider for ReplayProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        let model = request.model.clone();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let message = match self.next_step()? {
            ReplayStep::Content { text } => Message::assistant(text),
            ReplayStep::ToolCalls { calls } => Message::assistant("").with_tool_calls(calls),
            ReplayStep::Failure { message } => return Err(LlmError::RequestFailed(message)),
        };

        let prompt_tokens = (prompt_chars / 4) as u32;
        let completion_tokens = (message.content.len() / 4) as u32;
        let finish_reason = if message.tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        };

        Ok(GenerationResponse {
            id: format!("replay-{}", uuid::Uuid::new_v4()),
            model,
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: finish_reason.to_string(),
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}
