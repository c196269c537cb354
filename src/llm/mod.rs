//! Reasoning backend integration.
//!
//! Every reasoning step in the loop (the agent under training, the failure
//! analyzer, the scenario generator) goes through [`LlmProvider`]:
//!
//! ```ignore
//! use agent_forge::llm::{LiteLlmClient, LlmProvider, Message, GenerationRequest};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = client.generate(request).await?;
//! ```
//!
//! [`ReplayProvider`] serves scripted responses for offline runs and tests.

pub mod litellm;
pub mod replay;

pub use litellm::{
    Choice, FunctionCall, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider,
    Message, NativeToolCall, Usage,
};
pub use replay::{ReplayProvider, ReplayStep};
