//! Reward scoring for completed trajectories.
//!
//! [`RewardScorer::score`] is a pure function of a trajectory and its
//! scenario: scoring the same pair twice yields identical signals. The
//! signal keeps both sub-scores (tool-call correctness and success-criteria
//! satisfaction) alongside the combined value.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::types::Trajectory;
use crate::domain::{Scenario, SuccessCriterion};
use crate::error::ConfigError;

/// Default share of credit for a correct-but-unordered tool set.
const DEFAULT_PARTIAL_CEILING: f64 = 0.8;

/// Default score at or above which a run counts as passed.
const DEFAULT_PASS_THRESHOLD: f64 = 0.5;

/// How the actual tool-call sequence is compared to the expected one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Only an exact tool-name sequence earns credit.
    ExactSequence,
    /// Exact sequence earns full credit; a correct subset in any order earns partial credit.
    #[default]
    SubsetAnyOrder,
}

impl MatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPolicy::ExactSequence => "exact_sequence",
            MatchPolicy::SubsetAnyOrder => "subset_any_order",
        }
    }
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "exact_sequence" | "exact" => Ok(MatchPolicy::ExactSequence),
            "subset_any_order" | "subset" => Ok(MatchPolicy::SubsetAnyOrder),
            other => Err(format!("unknown match policy '{}'", other)),
        }
    }
}

/// Shape of partial credit as a function of the matched fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreditCurve {
    #[default]
    Linear,
    Quadratic,
    /// All-or-nothing at the threshold.
    Step { threshold: f64 },
}

impl CreditCurve {
    /// Maps a matched fraction in `[0, 1]` to a credit in `[0, 1]`.
    pub fn apply(&self, fraction: f64) -> f64 {
        match self {
            CreditCurve::Linear => fraction,
            CreditCurve::Quadratic => fraction * fraction,
            CreditCurve::Step { threshold } => {
                if fraction >= *threshold {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            CreditCurve::Linear => "linear(f)".to_string(),
            CreditCurve::Quadratic => "f^2".to_string(),
            CreditCurve::Step { threshold } => format!("step(f >= {:.2})", threshold),
        }
    }
}

/// Partial-credit settings for [`MatchPolicy::SubsetAnyOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialCredit {
    pub curve: CreditCurve,
    /// Maximum credit for a non-exact match.
    pub ceiling: f64,
}

impl Default for PartialCredit {
    fn default() -> Self {
        Self {
            curve: CreditCurve::default(),
            ceiling: DEFAULT_PARTIAL_CEILING,
        }
    }
}

/// Reward scoring configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    pub match_policy: MatchPolicy,
    pub partial_credit: PartialCredit,
    /// Weight of tool-call correctness in the combined value.
    pub tool_weight: f64,
    /// Weight of success-criteria satisfaction in the combined value.
    pub criteria_weight: f64,
    pub pass_threshold: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            partial_credit: PartialCredit::default(),
            tool_weight: 0.5,
            criteria_weight: 0.5,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl RewardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match_policy(mut self, match_policy: MatchPolicy) -> Self {
        self.match_policy = match_policy;
        self
    }

    pub fn with_partial_credit(mut self, curve: CreditCurve, ceiling: f64) -> Self {
        self.partial_credit = PartialCredit { curve, ceiling };
        self
    }

    pub fn with_weights(mut self, tool_weight: f64, criteria_weight: f64) -> Self {
        self.tool_weight = tool_weight;
        self.criteria_weight = criteria_weight;
        self
    }

    pub fn with_pass_threshold(mut self, pass_threshold: f64) -> Self {
        self.pass_threshold = pass_threshold;
        self
    }

    /// Validates weights, ceiling, and thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool_weight < 0.0 || self.criteria_weight < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "reward weights must be non-negative".to_string(),
            ));
        }
        if self.tool_weight + self.criteria_weight <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "reward weights must not both be zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.partial_credit.ceiling) {
            return Err(ConfigError::ValidationFailed(
                "partial credit ceiling must be between 0.0 and 1.0".to_string(),
            ));
        }
        if let CreditCurve::Step { threshold } = self.partial_credit.curve {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::ValidationFailed(
                    "step curve threshold must be between 0.0 and 1.0".to_string(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(ConfigError::ValidationFailed(
                "pass_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Human-readable form of the active scoring policy.
    pub fn describe(&self) -> String {
        let tool_policy = match self.match_policy {
            MatchPolicy::ExactSequence => "exact sequence = 1.0, otherwise 0.0".to_string(),
            MatchPolicy::SubsetAnyOrder => format!(
                "exact sequence = 1.0, otherwise {:.2} x {} where f = matched/expected",
                self.partial_credit.ceiling,
                self.partial_credit.curve.describe()
            ),
        };
        format!(
            "{}: {}; weights tool={:.2} criteria={:.2}; pass >= {:.2}",
            self.match_policy.as_str(),
            tool_policy,
            self.tool_weight,
            self.criteria_weight,
            self.pass_threshold
        )
    }
}

/// Outcome of one success criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionOutcome {
    pub description: String,
    pub satisfied: bool,
}

/// Sub-scores behind a reward value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    /// Tool-call correctness under the match policy; `None` when the scenario expects no calls.
    pub tool_call_correctness: Option<f64>,
    /// Longest common subsequence of actual and expected calls over expected length.
    pub ordering_correctness: Option<f64>,
    pub exact_sequence_match: bool,
    /// Fraction of success criteria satisfied.
    pub criteria_satisfaction: f64,
    pub criteria: Vec<CriterionOutcome>,
}

/// Structured score bound to exactly one trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardSignal {
    pub trajectory_id: Uuid,
    pub scenario_id: String,
    /// Combined value in `[0, 1]`.
    pub value: f64,
    pub passed: bool,
    pub breakdown: RewardBreakdown,
    pub explanation: String,
}

/// Scores trajectories against their scenarios.
#[derive(Debug, Clone, Default)]
pub struct RewardScorer {
    config: RewardConfig,
}

impl RewardScorer {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Scores a trajectory. Pure and deterministic.
    ///
    /// The trajectory should come from a run of `scenario`. A mismatch is
    /// logged and the signal carries the scenario's id.
    pub fn score(&self, trajectory: &Trajectory, scenario: &Scenario) -> RewardSignal {
        if trajectory.scenario_id != scenario.id {
            warn!(
                trajectory_scenario = %trajectory.scenario_id,
                scenario_id = %scenario.id,
                "Scoring a trajectory against a different scenario"
            );
        }

        let actual = trajectory.tool_sequence();
        let expected: Vec<&str> = scenario
            .expected_tool_calls
            .iter()
            .map(String::as_str)
            .collect();

        let exact = !expected.is_empty() && actual == expected;
        let (tool_score, ordering) = if expected.is_empty() {
            (None, None)
        } else {
            let tool_score = if exact {
                1.0
            } else {
                match self.config.match_policy {
                    MatchPolicy::ExactSequence => 0.0,
                    MatchPolicy::SubsetAnyOrder => {
                        let fraction = matched_fraction(&actual, &expected);
                        self.config.partial_credit.ceiling
                            * self.config.partial_credit.curve.apply(fraction)
                    }
                }
            };
            let ordering = lcs_len(&actual, &expected) as f64 / expected.len() as f64;
            (Some(tool_score), Some(ordering))
        };

        let criteria: Vec<CriterionOutcome> = scenario
            .success_criteria
            .iter()
            .map(|c| CriterionOutcome {
                description: c.describe(),
                satisfied: evaluate_criterion(c, trajectory),
            })
            .collect();
        let criteria_satisfaction = if criteria.is_empty() {
            if trajectory.is_completed() {
                1.0
            } else {
                0.0
            }
        } else {
            criteria.iter().filter(|c| c.satisfied).count() as f64 / criteria.len() as f64
        };

        let value = match tool_score {
            Some(tool) => {
                let total = self.config.tool_weight + self.config.criteria_weight;
                (self.config.tool_weight * tool + self.config.criteria_weight * criteria_satisfaction)
                    / total
            }
            None => criteria_satisfaction,
        }
        .clamp(0.0, 1.0);
        let passed = value >= self.config.pass_threshold;

        let explanation = format!(
            "tools {} (expected [{}], got [{}]); criteria {:.2}; {}",
            tool_score
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "n/a".to_string()),
            expected.join(", "),
            actual.join(", "),
            criteria_satisfaction,
            trajectory.terminal
        );

        RewardSignal {
            trajectory_id: trajectory.id,
            scenario_id: scenario.id.clone(),
            value,
            passed,
            breakdown: RewardBreakdown {
                tool_call_correctness: tool_score,
                ordering_correctness: ordering,
                exact_sequence_match: exact,
                criteria_satisfaction,
                criteria,
            },
            explanation,
        }
    }
}

/// Fraction of expected calls present in `actual`, counting multiplicity.
fn matched_fraction(actual: &[&str], expected: &[&str]) -> f64 {
    let mut remaining: Vec<&str> = actual.to_vec();
    let mut matched = 0;
    for name in expected {
        if let Some(pos) = remaining.iter().position(|a| a == name) {
            remaining.swap_remove(pos);
            matched += 1;
        }
    }
    matched as f64 / expected.len() as f64
}

fn lcs_len(a: &[&str], b: &[&str]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    for x in a {
        let mut curr = vec![0usize; b.len() + 1];
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        prev = curr;
    }
    prev[b.len()]
}

fn evaluate_criterion(criterion: &SuccessCriterion, trajectory: &Trajectory) -> bool {
    let answer = trajectory.final_answer.as_deref();
    match criterion {
        SuccessCriterion::ToolCalled { tool } => trajectory.tool_calls().any(|c| &c.name == tool),
        SuccessCriterion::ToolNotCalled { tool } => {
            !trajectory.tool_calls().any(|c| &c.name == tool)
        }
        SuccessCriterion::ResponseContains { tool, text } => trajectory
            .tool_calls()
            .filter(|c| tool.as_ref().map_or(true, |t| &c.name == t))
            .filter(|c| !c.outcome.is_error())
            .any(|c| c.outcome.render().contains(text.as_str())),
        SuccessCriterion::AnswerContains {
            text,
            case_sensitive,
        } => answer.is_some_and(|a| {
            if *case_sensitive {
                a.contains(text.as_str())
            } else {
                a.to_lowercase().contains(&text.to_lowercase())
            }
        }),
        SuccessCriterion::AnswerMatches { pattern } => {
            match Regex::new(pattern) {
                Ok(re) => answer.is_some_and(|a| re.is_match(a)),
                Err(_) => false,
            }
        }
        SuccessCriterion::Completed => trajectory.is_completed(),
        SuccessCriterion::NoToolErrors => trajectory.tool_errors() == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::DifficultyLevel;
    use crate::trajectory::collector::TrajectoryCollector;
    use crate::trajectory::types::{TerminalState, ToolCall, ToolOutcome, TruncationReason};
    use serde_json::json;

    fn ok_call(name: &str, response: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: json!({}),
            outcome: ToolOutcome::Response { response },
        }
    }

    fn trajectory(calls: &[&str], answer: Option<&str>) -> Trajectory {
        let mut collector = TrajectoryCollector::new("s1", "test");
        if !calls.is_empty() {
            collector.record_tool_calls(
                String::new(),
                calls.iter().map(|c| ok_call(c, json!("ok"))).collect(),
            );
        }
        let terminal = match answer {
            Some(a) => {
                collector.record_final_answer(String::new(), a.to_string());
                TerminalState::Completed
            }
            None => TerminalState::Truncated {
                reason: TruncationReason::TurnLimit,
            },
        };
        collector.finalize(terminal, 0)
    }

    fn scenario(expected: &[&str]) -> Scenario {
        Scenario::new("s1", "do it", DifficultyLevel::Easy).with_expected_tool_calls(expected.to_vec())
    }

    #[test]
    fn test_exact_sequence_full_credit() {
        let scorer = RewardScorer::default();
        let signal = scorer.score(&trajectory(&["A", "B"], Some("done")), &scenario(&["A", "B"]));
        assert_eq!(signal.breakdown.tool_call_correctness, Some(1.0));
        assert!(signal.breakdown.exact_sequence_match);
        assert_eq!(signal.breakdown.ordering_correctness, Some(1.0));
        assert!((signal.value - 1.0).abs() < f64::EPSILON);
        assert!(signal.passed);
    }

    #[test]
    fn test_mismatched_scenario_still_scored() {
        let scorer = RewardScorer::default();
        let other = Scenario::new("s2", "do it", DifficultyLevel::Easy).with_expected_tool_calls(["A"]);
        let signal = scorer.score(&trajectory(&["A"], Some("done")), &other);
        assert_eq!(signal.scenario_id, "s2");
        assert_eq!(signal.breakdown.tool_call_correctness, Some(1.0));
    }

    #[test]
    fn test_reversed_sequence_partial_under_subset() {
        let scorer = RewardScorer::default();
        let signal = scorer.score(&trajectory(&["B", "A"], Some("done")), &scenario(&["A", "B"]));
        let tool = signal.breakdown.tool_call_correctness.unwrap();
        assert!(tool > 0.0 && tool < 1.0);
        assert!((tool - 0.8).abs() < 1e-9);
        assert_eq!(signal.breakdown.ordering_correctness, Some(0.5));
    }

    #[test]
    fn test_reversed_sequence_zero_under_exact() {
        let scorer =
            RewardScorer::new(RewardConfig::default().with_match_policy(MatchPolicy::ExactSequence));
        let signal = scorer.score(&trajectory(&["B", "A"], Some("done")), &scenario(&["A", "B"]));
        assert_eq!(signal.breakdown.tool_call_correctness, Some(0.0));
    }

    #[test]
    fn test_partial_subset_curves() {
        let traj = trajectory(&["A"], Some("done"));
        let sc = scenario(&["A", "B"]);

        let linear = RewardScorer::default().score(&traj, &sc);
        assert!((linear.breakdown.tool_call_correctness.unwrap() - 0.4).abs() < 1e-9);

        let quadratic = RewardScorer::new(
            RewardConfig::default().with_partial_credit(CreditCurve::Quadratic, 1.0),
        )
        .score(&traj, &sc);
        assert!((quadratic.breakdown.tool_call_correctness.unwrap() - 0.25).abs() < 1e-9);

        let step = RewardScorer::new(
            RewardConfig::default().with_partial_credit(CreditCurve::Step { threshold: 0.75 }, 0.8),
        )
        .score(&traj, &sc);
        assert_eq!(step.breakdown.tool_call_correctness, Some(0.0));
    }

    #[test]
    fn test_multiset_matching() {
        let signal = RewardScorer::default()
            .score(&trajectory(&["A"], Some("done")), &scenario(&["A", "A"]));
        assert!((signal.breakdown.tool_call_correctness.unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_no_criteria_uses_completion() {
        let scorer = RewardScorer::default();
        let truncated = scorer.score(&trajectory(&["A"], None), &scenario(&["A"]));
        assert_eq!(truncated.breakdown.criteria_satisfaction, 0.0);
        assert!((truncated.value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_criteria_evaluation() {
        let mut collector = TrajectoryCollector::new("s1", "test");
        collector.record_tool_calls(
            String::new(),
            vec![
                ok_call("lookup_order", json!({"status": "shipped"})),
                ToolCall {
                    name: "refund".to_string(),
                    arguments: json!({}),
                    outcome: ToolOutcome::Error {
                        kind: "unknown_tool".to_string(),
                        message: "Unknown tool 'refund'".to_string(),
                    },
                },
            ],
        );
        collector.record_final_answer(String::new(), "Your order has SHIPPED #123".to_string());
        let traj = collector.finalize(TerminalState::Completed, 0);

        let sc = Scenario::new("s1", "where?", DifficultyLevel::Easy)
            .with_criterion(SuccessCriterion::ToolCalled {
                tool: "lookup_order".to_string(),
            })
            .with_criterion(SuccessCriterion::ResponseContains {
                tool: Some("lookup_order".to_string()),
                text: "shipped".to_string(),
            })
            .with_criterion(SuccessCriterion::AnswerContains {
                text: "shipped".to_string(),
                case_sensitive: false,
            })
            .with_criterion(SuccessCriterion::AnswerMatches {
                pattern: r"#\d+".to_string(),
            })
            .with_criterion(SuccessCriterion::NoToolErrors)
            .with_criterion(SuccessCriterion::ToolNotCalled {
                tool: "refund".to_string(),
            })
            .with_criterion(SuccessCriterion::Completed);

        let signal = RewardScorer::default().score(&traj, &sc);
        let satisfied: Vec<bool> = signal.breakdown.criteria.iter().map(|c| c.satisfied).collect();
        assert_eq!(satisfied, vec![true, true, true, true, false, false, true]);
        assert!((signal.breakdown.criteria_satisfaction - 5.0 / 7.0).abs() < 1e-9);
        assert_eq!(signal.breakdown.tool_call_correctness, None);
        assert!((signal.value - 5.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_deterministic() {
        let scorer = RewardScorer::default();
        let traj = trajectory(&["B", "A", "C"], Some("ok"));
        let sc = scenario(&["A", "B"]);
        assert_eq!(scorer.score(&traj, &sc), scorer.score(&traj, &sc));
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(RewardConfig::default().validate().is_ok());
        assert!(RewardConfig::default().with_weights(0.0, 0.0).validate().is_err());
        assert!(RewardConfig::default()
            .with_partial_credit(CreditCurve::Linear, 1.5)
            .validate()
            .is_err());
        assert!(RewardConfig::default().with_pass_threshold(-0.1).validate().is_err());
    }

    #[test]
    fn test_describe_mentions_curve() {
        let text = RewardConfig::default().describe();
        assert!(text.starts_with("subset_any_order"));
        assert!(text.contains("0.80 x linear(f)"));
    }

    #[test]
    fn test_match_policy_from_str() {
        assert_eq!("exact".parse::<MatchPolicy>(), Ok(MatchPolicy::ExactSequence));
        assert_eq!(
            "subset-any-order".parse::<MatchPolicy>(),
            Ok(MatchPolicy::SubsetAnyOrder)
        );
        assert!("fuzzy".parse::<MatchPolicy>().is_err());
    }
}
