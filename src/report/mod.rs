//! Run reports: persistence and per-round summaries.
//!
//! Reports read the round history; they never change it.

pub mod storage;

use serde::Serialize;

use crate::pipeline::{RoundHistory, RoundRecord};

pub use storage::{RunReportStorage, StorageError};

/// Condensed view of one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSummary {
    pub round: u32,
    pub evaluated: usize,
    pub mean_reward: f64,
    pub pass_rate: f64,
    /// Mean reward over seed scenarios.
    pub seed_mean: Option<f64>,
    /// Mean reward over generated scenarios.
    pub generated_mean: Option<f64>,
    /// Scenarios added to the catalog this round.
    pub new_scenarios: usize,
    pub drafts_rejected: usize,
    pub top_weakness: Option<String>,
    pub degraded: bool,
}

impl RoundSummary {
    /// Generated minus seed mean, when both were evaluated.
    pub fn generated_gap(&self) -> Option<f64> {
        Some(self.generated_mean? - self.seed_mean?)
    }
}

impl std::fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "round {}: {} scenarios, mean {:.3}, pass rate {:.0}%",
            self.round,
            self.evaluated,
            self.mean_reward,
            self.pass_rate * 100.0
        )?;
        match (self.seed_mean, self.generated_mean) {
            (Some(seed), Some(generated)) => {
                write!(f, ", seed {:.3} vs generated {:.3}", seed, generated)?
            }
            (Some(seed), None) => write!(f, ", seed {:.3}", seed)?,
            (None, Some(generated)) => write!(f, ", generated {:.3}", generated)?,
            (None, None) => {}
        }
        write!(
            f,
            ", +{} new ({} rejected)",
            self.new_scenarios, self.drafts_rejected
        )?;
        if let Some(ref weakness) = self.top_weakness {
            write!(f, ", top weakness {}", weakness)?;
        }
        if self.degraded {
            f.write_str(", degraded")?;
        }
        Ok(())
    }
}

/// Summarizes one round.
pub fn summarize_round(record: &RoundRecord) -> RoundSummary {
    RoundSummary {
        round: record.round,
        evaluated: record.stats.count,
        mean_reward: record.stats.mean,
        pass_rate: record.stats.pass_rate,
        seed_mean: record.stats.seed.as_ref().map(|s| s.mean),
        generated_mean: record.stats.generated.as_ref().map(|s| s.mean),
        new_scenarios: record.generated.len(),
        drafts_rejected: record.drafts_rejected,
        top_weakness: record
            .failure_report
            .as_ref()
            .and_then(|r| r.top_weakness())
            .map(str::to_string),
        degraded: record.is_degraded(),
    }
}

/// Summarizes every round, in order.
pub fn summarize_history(history: &RoundHistory) -> Vec<RoundSummary> {
    history.records().iter().map(summarize_round).collect()
}
