//! Round records and the append-only round history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::PlateauCriterion;
use crate::agents::FailureReport;
use crate::difficulty::DifficultyLevel;
use crate::domain::Scenario;
use crate::trajectory::{RewardSignal, Trajectory};

/// Phases of one round, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Evaluating,
    Scoring,
    Analyzing,
    Generating,
    CurriculumSelecting,
    Done,
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LoopPhase::Evaluating => "evaluating",
            LoopPhase::Scoring => "scoring",
            LoopPhase::Analyzing => "analyzing",
            LoopPhase::Generating => "generating",
            LoopPhase::CurriculumSelecting => "curriculum_selecting",
            LoopPhase::Done => "done",
        })
    }
}

/// One scenario's run and score within a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub difficulty: DifficultyLevel,
    /// Whether the scenario was produced by the generator.
    pub generated: bool,
    pub trajectory: Trajectory,
    pub reward: RewardSignal,
}

impl ScenarioResult {
    pub fn new(scenario: &Scenario, trajectory: Trajectory, reward: RewardSignal) -> Self {
        Self {
            scenario_id: scenario.id.clone(),
            difficulty: scenario.difficulty,
            generated: scenario.is_generated(),
            trajectory,
            reward,
        }
    }
}

/// Reward aggregate for a group of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub mean: f64,
    pub pass_rate: f64,
}

impl GroupStats {
    fn from_results<'a>(results: impl IntoIterator<Item = &'a ScenarioResult>) -> Option<Self> {
        let (count, sum, passes) = results.into_iter().fold((0usize, 0.0, 0usize), |acc, r| {
            (acc.0 + 1, acc.1 + r.reward.value, acc.2 + usize::from(r.reward.passed))
        });
        if count == 0 {
            return None;
        }
        Some(Self {
            count,
            mean: sum / count as f64,
            pass_rate: passes as f64 / count as f64,
        })
    }
}

/// Aggregate statistics of a round's rewards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub pass_rate: f64,
    pub by_tier: BTreeMap<DifficultyLevel, GroupStats>,
    /// Seed scenarios only.
    pub seed: Option<GroupStats>,
    /// Generated scenarios only.
    pub generated: Option<GroupStats>,
}

impl RewardStats {
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        let Some(overall) = GroupStats::from_results(results) else {
            return Self::default();
        };

        let values = results.iter().map(|r| r.reward.value);
        let min = values.clone().fold(f64::INFINITY, f64::min);
        let max = values.fold(f64::NEG_INFINITY, f64::max);

        let by_tier = DifficultyLevel::all()
            .into_iter()
            .filter_map(|tier| {
                GroupStats::from_results(results.iter().filter(|r| r.difficulty == tier))
                    .map(|stats| (tier, stats))
            })
            .collect();

        Self {
            count: overall.count,
            mean: overall.mean,
            min,
            max,
            pass_rate: overall.pass_rate,
            by_tier,
            seed: GroupStats::from_results(results.iter().filter(|r| !r.generated)),
            generated: GroupStats::from_results(results.iter().filter(|r| r.generated)),
        }
    }
}

/// Why a round produced less than a full result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Degradation {
    AnalysisFailed(String),
    GenerationFailed(String),
}

/// Everything one round produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    /// Scenarios evaluated this round, in run order.
    pub scenario_ids: Vec<String>,
    pub stats: RewardStats,
    pub results: Vec<ScenarioResult>,
    pub failure_report: Option<FailureReport>,
    /// Scenarios accepted into the catalog this round.
    pub generated: Vec<Scenario>,
    pub drafts_rejected: usize,
    pub degradations: Vec<Degradation>,
    /// Selection for the following round.
    pub next_scenario_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RoundRecord {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// Append-only sequence of round records.
///
/// Only the loop appends; everyone else gets shared references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundHistory {
    records: Vec<RoundRecord>,
}

impl RoundHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: RoundRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&RoundRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean reward per round, in order.
    pub fn mean_rewards(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.stats.mean).collect()
    }

    /// True when the latest mean improved on the mean `window` rounds
    /// earlier by less than `min_improvement`.
    pub fn is_plateau(&self, criterion: &PlateauCriterion) -> bool {
        let means = self.mean_rewards();
        if means.len() <= criterion.window {
            return false;
        }
        let latest = means[means.len() - 1];
        let earlier = means[means.len() - 1 - criterion.window];
        latest - earlier < criterion.min_improvement
    }
}
