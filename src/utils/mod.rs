//! Shared utility functions for agent-forge.

pub mod json_extraction;

pub use json_extraction::{
    analyze_json_structure, extract_from_code_block, extract_json_from_response,
    find_json_values, find_matching_close, try_extract_json_from_response, JsonExtractionError,
    JsonExtractionResult, JsonStructureAnalysis,
};
