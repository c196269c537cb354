//! Trajectory recording and reward scoring.
//!
//! A trajectory records one agent run against one scenario: each backend
//! turn, each tool call with the environment's answer, and the terminal
//! state. [`RewardScorer`] turns a trajectory into a [`RewardSignal`].
//!
//! ```rust,ignore
//! use agent_forge::trajectory::{RewardScorer, RewardConfig};
//!
//! let scorer = RewardScorer::new(RewardConfig::default());
//! let signal = scorer.score(&trajectory, &scenario);
//! println!("{:.2} ({})", signal.value, signal.explanation);
//! ```

pub mod collector;
pub mod reward;
pub mod types;

pub use collector::TrajectoryCollector;
pub use reward::{
    CreditCurve, CriterionOutcome, MatchPolicy, PartialCredit, RewardBreakdown, RewardConfig,
    RewardScorer, RewardSignal,
};
pub use types::{
    TerminalState, TokenUsage, ToolCall, ToolOutcome, Trajectory, TruncationReason, Turn,
    TurnAction,
};
