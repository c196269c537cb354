//! agent-forge: co-evolutionary training loop for tool-using agents.
//!
//! An agent runs scenarios against simulated tools; each run is scored, the
//! failures are diagnosed, and new scenarios aimed at the diagnosed
//! weaknesses join the catalog for the next round.

// Core modules
pub mod agent;
pub mod agents;
pub mod cli;
pub mod curriculum;
pub mod difficulty;
pub mod domain;
pub mod environment;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod trajectory;
pub mod utils;
pub mod validation;

// Re-export commonly used error types
pub use agents::{AnalysisError, GenerationError};
pub use error::{ConfigError, DomainError, EnvironmentError, LlmError};
pub use report::StorageError;
