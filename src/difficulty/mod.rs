//! Difficulty tiers for scenarios.
//!
//! Tiers are totally ordered (`Easy < Medium < Hard`); the curriculum relies
//! on this ordering to progress through the scenario set.

use serde::{Deserialize, Serialize};

/// The difficulty tier of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    /// All tiers in ascending order.
    pub fn all() -> [DifficultyLevel; 3] {
        [
            DifficultyLevel::Easy,
            DifficultyLevel::Medium,
            DifficultyLevel::Hard,
        ]
    }

    /// Zero-based rank of the tier.
    pub fn rank(&self) -> u8 {
        match self {
            DifficultyLevel::Easy => 0,
            DifficultyLevel::Medium => 1,
            DifficultyLevel::Hard => 2,
        }
    }

    /// The next harder tier, saturating at `Hard`.
    pub fn harder(&self) -> DifficultyLevel {
        match self {
            DifficultyLevel::Easy => DifficultyLevel::Medium,
            DifficultyLevel::Medium | DifficultyLevel::Hard => DifficultyLevel::Hard,
        }
    }

    /// Returns the lowercase name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
        }
    }

    /// Parses a tier name. Case and surrounding whitespace are ignored.
    pub fn parse(s: &str) -> Option<DifficultyLevel> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(DifficultyLevel::Easy),
            "medium" => Some(DifficultyLevel::Medium),
            "hard" => Some(DifficultyLevel::Hard),
            _ => None,
        }
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
