//! Backend-driven agents of the training loop.
//!
//! - [`FailureAnalyzer`] groups a round's low-reward runs into weakness categories.
//! - [`ScenarioGenerator`] drafts new scenarios aimed at those weaknesses.

pub mod analyzer_agent;
pub mod error;
pub mod scenario_generator;

pub use analyzer_agent::{
    normalize_category, AnalyzerConfig, Evaluation, Evidence, FailureAnalyzer, FailureReport,
    KNOWN_CATEGORIES, OTHER_CATEGORY,
};
pub use error::{AnalysisError, AnalysisResult, GenerationError, GenerationResult};
pub use scenario_generator::{content_fingerprint, GeneratorConfig, ScenarioGenerator};
