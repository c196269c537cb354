//! Error types for the analyzer and generator agents.
//!
//! Both are recoverable: a failed analysis or a dropped draft degrades the
//! round, it never aborts the run.

use thiserror::Error;

use crate::error::LlmError;

/// Errors from failure analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The reasoning backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    /// The backend answered, but not in the failure report shape.
    #[error("Failed to parse analysis response: {0}")]
    BackendParse(String),

    /// Every classification referenced an unknown scenario or was empty.
    #[error("Analysis produced no usable classifications")]
    NoUsableClassifications,
}

/// Errors from scenario generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The reasoning backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    /// The backend answered, but not with a scenario draft.
    #[error("Failed to parse scenario draft: {0}")]
    BackendParse(String),

    /// The draft failed schema validation.
    #[error("Draft '{id}' failed validation: {}", errors.join("; "))]
    Validation { id: String, errors: Vec<String> },

    /// The draft id is already in the catalog.
    #[error("Draft id '{id}' collides with an existing scenario")]
    IdCollision { id: String },

    /// The draft repeats an existing scenario's user message.
    #[error("Draft '{id}' duplicates scenario '{existing}'")]
    DuplicateContent { id: String, existing: String },
}

impl GenerationError {
    /// Returns true if the error is about a single draft, not the backend.
    pub fn is_draft_rejection(&self) -> bool {
        matches!(
            self,
            GenerationError::Validation { .. }
                | GenerationError::IdCollision { .. }
                | GenerationError::DuplicateContent { .. }
        )
    }
}

/// Result type for analysis.
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// Result type for generation.
pub type GenerationResult<T> = std::result::Result<T, GenerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = GenerationError::Validation {
            id: "gen_r1_reasoning_1".to_string(),
            errors: vec!["user_message: is empty".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Draft 'gen_r1_reasoning_1' failed validation: user_message: is empty"
        );
        assert!(err.is_draft_rejection());
    }

    #[test]
    fn test_backend_error_is_not_draft_rejection() {
        let err = GenerationError::from(LlmError::RequestFailed("down".to_string()));
        assert!(!err.is_draft_rejection());
    }
}
