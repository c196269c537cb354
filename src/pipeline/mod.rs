//! The co-evolutionary training loop.
//!
//! # Round Flow
//!
//! 1. **Evaluating**: the agent runs every selected scenario against the simulated tools
//! 2. **Scoring**: each trajectory is scored against its scenario
//! 3. **Analyzing**: low-reward runs are grouped into weakness categories
//! 4. **Generating**: new scenarios targeting those weaknesses join the catalog
//! 5. **CurriculumSelecting**: the curriculum picks the next round's scenarios
//!
//! The loop ends after the configured number of rounds or when mean reward
//! plateaus. Every round appends one [`RoundRecord`] to the [`RoundHistory`].
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_forge::domain::Domain;
//! use agent_forge::pipeline::{ForgeConfig, ForgeOrchestrator};
//!
//! let domain = Domain::load("orders.yaml")?;
//! let config = ForgeConfig::from_env()?.with_rounds(5);
//! let mut orchestrator = ForgeOrchestrator::new(domain, backend.clone(), backend, config)?;
//!
//! for record in orchestrator.run().await.records() {
//!     println!("round {}: mean {:.2}", record.round, record.stats.mean);
//! }
//! ```

pub mod config;
pub mod history;
pub mod orchestrator;

pub use config::{ForgeConfig, LoopConfig, PlateauCriterion};
pub use history::{
    Degradation, GroupStats, LoopPhase, RewardStats, RoundHistory, RoundRecord, ScenarioResult,
};
pub use orchestrator::ForgeOrchestrator;
