//! Rolling performance statistics per scenario and per difficulty tier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyLevel;
use crate::domain::Scenario;
use crate::trajectory::RewardSignal;

/// Default smoothing factor for the reward moving average.
pub const DEFAULT_EMA_ALPHA: f64 = 0.5;

/// Performance statistics for one scenario or one tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub attempts: u32,
    pub passes: u32,
    /// Exponential moving average of reward; meaningless while `attempts == 0`.
    pub ema_reward: f64,
    pub last_reward: f64,
    pub last_round: u32,
}

impl PerformanceStats {
    fn record(&mut self, round: u32, reward: f64, passed: bool, alpha: f64) {
        self.ema_reward = if self.attempts == 0 {
            reward
        } else {
            alpha * reward + (1.0 - alpha) * self.ema_reward
        };
        self.attempts += 1;
        if passed {
            self.passes += 1;
        }
        self.last_reward = reward;
        self.last_round = round;
    }

    pub fn is_unseen(&self) -> bool {
        self.attempts == 0
    }

    /// Fraction of attempts that passed; 0 when unseen.
    pub fn pass_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.passes as f64 / self.attempts as f64
        }
    }
}

/// Curriculum memory carried between rounds.
///
/// Only [`super::Curriculum`] mutates it, once per round after scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumState {
    alpha: f64,
    scenarios: BTreeMap<String, PerformanceStats>,
    tiers: BTreeMap<DifficultyLevel, PerformanceStats>,
    rounds_observed: u32,
}

impl Default for CurriculumState {
    fn default() -> Self {
        Self::new(DEFAULT_EMA_ALPHA)
    }
}

impl CurriculumState {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            scenarios: BTreeMap::new(),
            tiers: BTreeMap::new(),
            rounds_observed: 0,
        }
    }

    /// Folds one round's scores into the statistics.
    pub(crate) fn observe<'a, I>(&mut self, round: u32, results: I)
    where
        I: IntoIterator<Item = (&'a Scenario, &'a RewardSignal)>,
    {
        for (scenario, reward) in results {
            self.scenarios
                .entry(scenario.id.clone())
                .or_default()
                .record(round, reward.value, reward.passed, self.alpha);
            self.tiers
                .entry(scenario.difficulty)
                .or_default()
                .record(round, reward.value, reward.passed, self.alpha);
        }
        self.rounds_observed += 1;
    }

    pub fn scenario(&self, id: &str) -> Option<&PerformanceStats> {
        self.scenarios.get(id)
    }

    pub fn tier(&self, tier: DifficultyLevel) -> Option<&PerformanceStats> {
        self.tiers.get(&tier)
    }

    /// Attempts so far for a scenario; 0 when unseen.
    pub fn attempts(&self, id: &str) -> u32 {
        self.scenarios.get(id).map_or(0, |s| s.attempts)
    }

    pub fn rounds_observed(&self) -> u32 {
        self.rounds_observed
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
