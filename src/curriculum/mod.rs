//! Curriculum: which scenarios the next round presents.
//!
//! The loop only talks to [`Curriculum`]; the concrete policy is a
//! [`CurriculumStrategy`] picked from [`StrategyKind`] by configuration.

pub mod state;
pub mod strategy;

use std::sync::Arc;

use tracing::debug;

use crate::domain::Scenario;
use crate::error::ConfigError;
use crate::trajectory::RewardSignal;

pub use state::{CurriculumState, PerformanceStats, DEFAULT_EMA_ALPHA};
pub use strategy::{
    CurriculumStrategy, DifficultyAscendingStrategy, ShuffledStrategy, StrategyKind,
    UniformStrategy, WeaknessWeightedStrategy, DEFAULT_ADVANCE_THRESHOLD,
};

/// Configuration for the curriculum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurriculumConfig {
    pub strategy: StrategyKind,
    /// Smoothing factor for reward moving averages, in `(0, 1]`.
    pub ema_alpha: f64,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            ema_alpha: DEFAULT_EMA_ALPHA,
        }
    }
}

impl CurriculumConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_ema_alpha(mut self, alpha: f64) -> Self {
        self.ema_alpha = alpha;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(ConfigError::ValidationFailed(
                "ema_alpha must be in (0.0, 1.0]".to_string(),
            ));
        }
        if let StrategyKind::DifficultyAscending { advance_threshold } = self.strategy {
            if !(0.0..=1.0).contains(&advance_threshold) {
                return Err(ConfigError::ValidationFailed(
                    "advance_threshold must be between 0.0 and 1.0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Curriculum state plus the strategy reading it.
#[derive(Debug)]
pub struct Curriculum {
    state: CurriculumState,
    strategy: Box<dyn CurriculumStrategy>,
}

impl Curriculum {
    pub fn new(config: CurriculumConfig) -> Self {
        Self {
            state: CurriculumState::new(config.ema_alpha),
            strategy: config.strategy.build(),
        }
    }

    /// Uses a custom strategy.
    pub fn with_strategy(state: CurriculumState, strategy: Box<dyn CurriculumStrategy>) -> Self {
        Self { state, strategy }
    }

    pub fn state(&self) -> &CurriculumState {
        &self.state
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Records a finished round's scores.
    pub fn observe<'a, I>(&mut self, round: u32, results: I)
    where
        I: IntoIterator<Item = (&'a Scenario, &'a RewardSignal)>,
    {
        self.state.observe(round, results);
    }

    /// Ordered scenarios for the next round.
    pub fn select_next_round(
        &self,
        available: &[Arc<Scenario>],
        round_size: usize,
    ) -> Vec<Arc<Scenario>> {
        let selected = self.strategy.select(&self.state, available, round_size);
        debug!(
            strategy = self.strategy.name(),
            available = available.len(),
            selected = selected.len(),
            "Selected next round"
        );
        selected
    }
}
