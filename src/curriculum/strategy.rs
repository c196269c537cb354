//! Scenario selection strategies.
//!
//! Every strategy is a pure function of the state and the available
//! scenarios: identical inputs give the identical ordered selection. Equal
//! weights are broken by scenario id.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::state::CurriculumState;
use crate::difficulty::DifficultyLevel;
use crate::domain::Scenario;

/// Default per-tier pass rate needed to unlock the next tier.
pub const DEFAULT_ADVANCE_THRESHOLD: f64 = 0.5;

/// Picks the scenarios for the next round.
pub trait CurriculumStrategy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Returns at most `round_size` scenarios from `available`, in run order.
    fn select(
        &self,
        state: &CurriculumState,
        available: &[Arc<Scenario>],
        round_size: usize,
    ) -> Vec<Arc<Scenario>>;
}

/// The closed set of strategies selectable by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
    Uniform,
    #[default]
    WeaknessWeighted,
    DifficultyAscending { advance_threshold: f64 },
    Shuffled { seed: u64 },
}

impl StrategyKind {
    pub fn build(&self) -> Box<dyn CurriculumStrategy> {
        match *self {
            StrategyKind::Uniform => Box::new(UniformStrategy),
            StrategyKind::WeaknessWeighted => Box::new(WeaknessWeightedStrategy),
            StrategyKind::DifficultyAscending { advance_threshold } => {
                Box::new(DifficultyAscendingStrategy { advance_threshold })
            }
            StrategyKind::Shuffled { seed } => Box::new(ShuffledStrategy { seed }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Uniform => "uniform",
            StrategyKind::WeaknessWeighted => "weakness_weighted",
            StrategyKind::DifficultyAscending { .. } => "difficulty_ascending",
            StrategyKind::Shuffled { .. } => "shuffled",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    /// Parses a strategy name with default parameters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "uniform" => Ok(StrategyKind::Uniform),
            "weakness_weighted" | "weakness" => Ok(StrategyKind::WeaknessWeighted),
            "difficulty_ascending" | "ascending" => Ok(StrategyKind::DifficultyAscending {
                advance_threshold: DEFAULT_ADVANCE_THRESHOLD,
            }),
            "shuffled" | "random" => Ok(StrategyKind::Shuffled { seed: 0 }),
            other => Err(format!("unknown curriculum strategy '{}'", other)),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Least-attempted scenarios first.
#[derive(Debug, Clone, Copy)]
pub struct UniformStrategy;

impl CurriculumStrategy for UniformStrategy {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn select(
        &self,
        state: &CurriculumState,
        available: &[Arc<Scenario>],
        round_size: usize,
    ) -> Vec<Arc<Scenario>> {
        let mut ranked = available.to_vec();
        ranked.sort_by(|a, b| {
            state
                .attempts(&a.id)
                .cmp(&state.attempts(&b.id))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(round_size);
        ranked
    }
}

/// Scenarios with low recent reward, in weak tiers, first. Unseen scenarios
/// weigh the most.
#[derive(Debug, Clone, Copy)]
pub struct WeaknessWeightedStrategy;

impl WeaknessWeightedStrategy {
    /// Selection weight in `[0, 1]`; higher is picked first.
    pub fn weight(state: &CurriculumState, scenario: &Scenario) -> f64 {
        let own = match state.scenario(&scenario.id) {
            Some(stats) if !stats.is_unseen() => stats.ema_reward,
            _ => return 1.0,
        };
        let tier = state
            .tier(scenario.difficulty)
            .filter(|t| !t.is_unseen())
            .map_or(0.0, |t| t.ema_reward);
        0.5 * (1.0 - own) + 0.5 * (1.0 - tier)
    }
}

impl CurriculumStrategy for WeaknessWeightedStrategy {
    fn name(&self) -> &'static str {
        "weakness_weighted"
    }

    fn select(
        &self,
        state: &CurriculumState,
        available: &[Arc<Scenario>],
        round_size: usize,
    ) -> Vec<Arc<Scenario>> {
        let mut weighted: Vec<(f64, Arc<Scenario>)> = available
            .iter()
            .map(|s| (Self::weight(state, s), Arc::clone(s)))
            .collect();
        weighted.sort_by(|(wa, a), (wb, b)| wb.total_cmp(wa).then_with(|| a.id.cmp(&b.id)));
        weighted
            .into_iter()
            .take(round_size)
            .map(|(_, s)| s)
            .collect()
    }
}

/// Gates harder tiers until the easier ones are passed often enough.
#[derive(Debug, Clone, Copy)]
pub struct DifficultyAscendingStrategy {
    pub advance_threshold: f64,
}

impl DifficultyAscendingStrategy {
    /// Lowest tier present in `available` not yet passed at the threshold.
    /// When every tier is passed, the hardest one present.
    pub fn frontier(
        &self,
        state: &CurriculumState,
        available: &[Arc<Scenario>],
    ) -> Option<DifficultyLevel> {
        let mut present: Vec<DifficultyLevel> = available.iter().map(|s| s.difficulty).collect();
        present.sort();
        present.dedup();

        present
            .iter()
            .copied()
            .find(|tier| {
                state
                    .tier(*tier)
                    .map_or(true, |stats| stats.pass_rate() < self.advance_threshold)
            })
            .or_else(|| present.last().copied())
    }
}

impl CurriculumStrategy for DifficultyAscendingStrategy {
    fn name(&self) -> &'static str {
        "difficulty_ascending"
    }

    fn select(
        &self,
        state: &CurriculumState,
        available: &[Arc<Scenario>],
        round_size: usize,
    ) -> Vec<Arc<Scenario>> {
        let Some(frontier) = self.frontier(state, available) else {
            return Vec::new();
        };

        let mut unlocked: Vec<Arc<Scenario>> = available
            .iter()
            .filter(|s| s.difficulty <= frontier)
            .cloned()
            .collect();
        // Frontier tier first, then the tiers below it.
        unlocked.sort_by(|a, b| {
            b.difficulty
                .cmp(&a.difficulty)
                .then_with(|| state.attempts(&a.id).cmp(&state.attempts(&b.id)))
                .then_with(|| a.id.cmp(&b.id))
        });
        unlocked.truncate(round_size);
        unlocked
    }
}

/// Seeded random order, reshuffled every round.
#[derive(Debug, Clone, Copy)]
pub struct ShuffledStrategy {
    pub seed: u64,
}

impl CurriculumStrategy for ShuffledStrategy {
    fn name(&self) -> &'static str {
        "shuffled"
    }

    fn select(
        &self,
        state: &CurriculumState,
        available: &[Arc<Scenario>],
        round_size: usize,
    ) -> Vec<Arc<Scenario>> {
        let mut ordered = available.to_vec();
        ordered.sort_by(|a, b| a.id.cmp(&b.id));

        let mut rng =
            ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(u64::from(state.rounds_observed())));
        ordered.shuffle(&mut rng);
        ordered.truncate(round_size);
        ordered
    }
}
