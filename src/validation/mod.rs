//! Scenario validation shared by domain loading and scenario generation.

pub mod scenario_validator;

pub use scenario_validator::{
    is_valid_id, SchemaError, SchemaErrorKind, SchemaValidationResult, ScenarioValidator,
};
