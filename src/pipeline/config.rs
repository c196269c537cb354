//! Configuration for the training loop.
//!
//! [`ForgeConfig`] aggregates the per-component configurations. Every part
//! has defaults, builder setters and `validate()`; [`ForgeConfig::from_env`]
//! overlays `FORGE_*` environment variables and validates the result.

use crate::agent::AgentConfig;
use crate::agents::{AnalyzerConfig, GeneratorConfig};
use crate::curriculum::{CurriculumConfig, StrategyKind};
use crate::error::ConfigError;
use crate::trajectory::{MatchPolicy, RewardConfig};

/// Stop when mean reward has stopped improving.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateauCriterion {
    /// Rounds compared: the latest mean against the mean `window` rounds earlier.
    pub window: usize,
    /// Improvement below this counts as a plateau.
    pub min_improvement: f64,
}

/// Settings for the round loop itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Maximum number of rounds.
    pub rounds: u32,
    /// Scenarios per round; `None` evaluates everything the curriculum offers.
    pub round_size: Option<usize>,
    /// Scenarios evaluated concurrently within a round.
    pub concurrency: usize,
    /// Optional early stop.
    pub plateau: Option<PlateauCriterion>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            round_size: None,
            concurrency: 1, // Backends are not assumed to batch
            plateau: None,
        }
    }
}

/// Full configuration for a training run.
#[derive(Debug, Clone, Default)]
pub struct ForgeConfig {
    pub loop_config: LoopConfig,
    pub agent: AgentConfig,
    pub reward: RewardConfig,
    pub analyzer: AnalyzerConfig,
    pub generator: GeneratorConfig,
    pub curriculum: CurriculumConfig,
}

impl ForgeConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORGE_ROUNDS`: Number of rounds (default: 3)
    /// - `FORGE_ROUND_SIZE`: Scenarios per round (default: all)
    /// - `FORGE_CONCURRENCY`: Concurrent scenario evaluations (default: 1)
    /// - `FORGE_PLATEAU_WINDOW` / `FORGE_PLATEAU_MIN_IMPROVEMENT`: Early stop (both required)
    /// - `FORGE_MODEL`: Model for the agent under training
    /// - `FORGE_MAX_TURNS`: Turn cap per run (default: 10)
    /// - `FORGE_MALFORMED_TOLERANCE`: Failed turns before truncation (default: 3)
    /// - `FORGE_PLAIN_TEXT_ANSWERS`: Accept non-JSON output as an answer (default: false)
    /// - `FORGE_NATIVE_TOOLS`: Send the tool schema for native calling (default: false)
    /// - `FORGE_MATCH_POLICY`: `exact` or `subset` (default: subset)
    /// - `FORGE_PASS_THRESHOLD`: Reward counted as a pass (default: 0.5)
    /// - `FORGE_LOW_REWARD_THRESHOLD`: Reward below which runs are analyzed (default: 0.5)
    /// - `FORGE_MAX_DRAFTS`: Generated drafts per round (default: 3)
    /// - `FORGE_STRATEGY`: `uniform`, `weakness_weighted`, `difficulty_ascending`, `shuffled`
    /// - `FORGE_SEED`: Seed for the shuffled strategy
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ForgeConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Loop settings
        if let Some(val) = lookup("FORGE_ROUNDS") {
            config.loop_config.rounds = parse_env_value(&val, "FORGE_ROUNDS")?;
        }

        if let Some(val) = lookup("FORGE_ROUND_SIZE") {
            config.loop_config.round_size = Some(parse_env_value(&val, "FORGE_ROUND_SIZE")?);
        }

        if let Some(val) = lookup("FORGE_CONCURRENCY") {
            config.loop_config.concurrency = parse_env_value(&val, "FORGE_CONCURRENCY")?;
        }

        match (
            lookup("FORGE_PLATEAU_WINDOW"),
            lookup("FORGE_PLATEAU_MIN_IMPROVEMENT"),
        ) {
            (Some(window), Some(min_improvement)) => {
                config.loop_config.plateau = Some(PlateauCriterion {
                    window: parse_env_value(&window, "FORGE_PLATEAU_WINDOW")?,
                    min_improvement: parse_env_value(
                        &min_improvement,
                        "FORGE_PLATEAU_MIN_IMPROVEMENT",
                    )?,
                });
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "FORGE_PLATEAU_WINDOW".to_string(),
                    message: "FORGE_PLATEAU_WINDOW and FORGE_PLATEAU_MIN_IMPROVEMENT must be set together"
                        .to_string(),
                });
            }
        }

        // Agent settings
        if let Some(val) = lookup("FORGE_MODEL") {
            config.agent.model = val;
        }

        if let Some(val) = lookup("FORGE_MAX_TURNS") {
            config.agent.max_turns = parse_env_value(&val, "FORGE_MAX_TURNS")?;
        }

        if let Some(val) = lookup("FORGE_MALFORMED_TOLERANCE") {
            config.agent.malformed_tolerance = parse_env_value(&val, "FORGE_MALFORMED_TOLERANCE")?;
        }

        if let Some(val) = lookup("FORGE_PLAIN_TEXT_ANSWERS") {
            config.agent.accept_plain_text_answers =
                parse_env_bool(&val, "FORGE_PLAIN_TEXT_ANSWERS")?;
        }

        if let Some(val) = lookup("FORGE_NATIVE_TOOLS") {
            config.agent.native_tools = parse_env_bool(&val, "FORGE_NATIVE_TOOLS")?;
        }

        // Reward settings
        if let Some(val) = lookup("FORGE_MATCH_POLICY") {
            config.reward.match_policy = parse_env_value::<MatchPolicy>(&val, "FORGE_MATCH_POLICY")?;
        }

        if let Some(val) = lookup("FORGE_PASS_THRESHOLD") {
            config.reward.pass_threshold = parse_env_value(&val, "FORGE_PASS_THRESHOLD")?;
        }

        // Analyzer and generator settings
        if let Some(val) = lookup("FORGE_LOW_REWARD_THRESHOLD") {
            config.analyzer.low_reward_threshold =
                parse_env_value(&val, "FORGE_LOW_REWARD_THRESHOLD")?;
        }

        if let Some(val) = lookup("FORGE_MAX_DRAFTS") {
            config.generator.max_drafts = parse_env_value(&val, "FORGE_MAX_DRAFTS")?;
        }

        // Curriculum settings
        if let Some(val) = lookup("FORGE_STRATEGY") {
            config.curriculum.strategy = parse_env_value::<StrategyKind>(&val, "FORGE_STRATEGY")?;
        }

        if let Some(val) = lookup("FORGE_SEED") {
            let seed: u64 = parse_env_value(&val, "FORGE_SEED")?;
            match config.curriculum.strategy {
                StrategyKind::Shuffled { .. } => {
                    config.curriculum.strategy = StrategyKind::Shuffled { seed };
                }
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "FORGE_SEED".to_string(),
                        message: "only applies to the shuffled strategy".to_string(),
                    });
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let loop_config = &self.loop_config;
        if loop_config.rounds == 0 {
            return Err(ConfigError::ValidationFailed(
                "rounds must be greater than 0".to_string(),
            ));
        }

        if loop_config.round_size == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "round_size must be greater than 0".to_string(),
            ));
        }

        if loop_config.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        if let Some(plateau) = loop_config.plateau {
            if plateau.window == 0 {
                return Err(ConfigError::ValidationFailed(
                    "plateau window must be greater than 0".to_string(),
                ));
            }
            if plateau.min_improvement < 0.0 {
                return Err(ConfigError::ValidationFailed(
                    "plateau min_improvement cannot be negative".to_string(),
                ));
            }
        }

        self.agent.validate()?;
        self.reward.validate()?;
        self.analyzer.validate()?;
        self.generator.validate()?;
        self.curriculum.validate()?;
        Ok(())
    }

    /// Builder method to set the number of rounds.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.loop_config.rounds = rounds;
        self
    }

    /// Builder method to set the round size.
    pub fn with_round_size(mut self, round_size: usize) -> Self {
        self.loop_config.round_size = Some(round_size);
        self
    }

    /// Builder method to set evaluation concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.loop_config.concurrency = concurrency;
        self
    }

    /// Builder method to enable plateau stopping.
    pub fn with_plateau(mut self, window: usize, min_improvement: f64) -> Self {
        self.loop_config.plateau = Some(PlateauCriterion {
            window,
            min_improvement,
        });
        self
    }

    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_reward(mut self, reward: RewardConfig) -> Self {
        self.reward = reward;
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_curriculum(mut self, curriculum: CurriculumConfig) -> Self {
        self.curriculum = curriculum;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
