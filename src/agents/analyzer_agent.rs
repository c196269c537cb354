//! Failure analyzer: groups low-reward runs into named weakness categories.
//!
//! The backend makes the categorization judgment. This module decides which
//! runs qualify, folds the backend's labels into a bounded set of
//! categories, and rejects output that does not fit the report shape.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{AnalysisError, AnalysisResult};
use crate::domain::Scenario;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::trajectory::{RewardSignal, Trajectory, TurnAction};
use crate::utils::try_extract_json_from_response;

/// Category names the analyzer prefers.
pub const KNOWN_CATEGORIES: [&str; 5] = [
    "tool_selection",
    "argument_formatting",
    "reasoning",
    "instruction_following",
    "error_recovery",
];

/// Bucket for labels past the category bound.
pub const OTHER_CATEGORY: &str = "other";

/// Longest tool response shown to the backend, in characters.
const MAX_RESPONSE_PREVIEW: usize = 200;

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert evaluator diagnosing why a tool-using agent failed test scenarios.

For each failed run, identify the root cause and assign exactly one category:
- tool_selection: called the wrong tool, skipped a required tool, or called an unnecessary one
- argument_formatting: right tool, wrong or malformed arguments
- reasoning: misread tool results or drew the wrong conclusion
- instruction_following: ignored the response format or the user's request
- error_recovery: did not recover after a tool error
You may use a different short snake_case category if none of these fit.

Output Format:
You MUST respond with ONLY a JSON object in this exact format:
{
  "failures": [
    {"scenario_id": "<id from the input>", "category": "<category>", "rationale": "<one sentence>"}
  ]
}

Do not include any text outside the JSON object."#;

const ANALYSIS_USER_TEMPLATE: &str = r#"The following runs scored below {threshold}.

{runs}
Classify the root cause of each failed run."#;

/// Configuration for the failure analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Runs scoring strictly below this value are analyzed.
    pub low_reward_threshold: f64,
    /// Upper bound on distinct categories in a report.
    pub max_categories: usize,
    /// Temperature for LLM generation.
    pub temperature: f64,
    /// Maximum tokens for LLM response.
    pub max_tokens: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            low_reward_threshold: 0.5,
            max_categories: 5,
            temperature: 0.3,
            max_tokens: 1500,
        }
    }
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_low_reward_threshold(mut self, threshold: f64) -> Self {
        self.low_reward_threshold = threshold;
        self
    }

    pub fn with_max_categories(mut self, max_categories: usize) -> Self {
        self.max_categories = max_categories;
        self
    }

    /// Sets the temperature for LLM generation.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        if !(0.0..=1.0).contains(&self.low_reward_threshold) {
            return Err(crate::error::ConfigError::ValidationFailed(
                "low_reward_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.max_categories == 0 {
            return Err(crate::error::ConfigError::ValidationFailed(
                "max_categories must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One scored run, borrowed from the round results.
#[derive(Debug, Clone, Copy)]
pub struct Evaluation<'a> {
    pub scenario: &'a Scenario,
    pub trajectory: &'a Trajectory,
    pub reward: &'a RewardSignal,
}

/// Scenarios and rationales supporting one weakness category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub scenario_ids: BTreeSet<String>,
    pub rationales: Vec<String>,
}

impl Evidence {
    fn add(&mut self, scenario_id: String, rationale: String) {
        self.scenario_ids.insert(scenario_id);
        let rationale = rationale.trim();
        if !rationale.is_empty()
            && !self
                .rationales
                .iter()
                .any(|r| r.eq_ignore_ascii_case(rationale))
        {
            self.rationales.push(rationale.to_string());
        }
    }

    fn merge(&mut self, other: Evidence) {
        self.scenario_ids.extend(other.scenario_ids);
        for rationale in other.rationales {
            if !self
                .rationales
                .iter()
                .any(|r| r.eq_ignore_ascii_case(&rationale))
            {
                self.rationales.push(rationale);
            }
        }
    }

    /// Number of scenarios supporting the category.
    pub fn weight(&self) -> usize {
        self.scenario_ids.len()
    }
}

/// Weakness categories for one round. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub round: u32,
    pub categories: BTreeMap<String, Evidence>,
    /// Low-reward scenarios the backend did not classify.
    pub unclassified: Vec<String>,
}

impl FailureReport {
    /// A report with no findings.
    pub fn empty(round: u32) -> Self {
        Self {
            round,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Categories by descending evidence, ties by name.
    pub fn ranked_categories(&self) -> Vec<(&str, &Evidence)> {
        let mut ranked: Vec<(&str, &Evidence)> = self
            .categories
            .iter()
            .map(|(name, evidence)| (name.as_str(), evidence))
            .collect();
        ranked.sort_by(|a, b| b.1.weight().cmp(&a.1.weight()).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// The category with the most evidence.
    pub fn top_weakness(&self) -> Option<&str> {
        self.ranked_categories().first().map(|(name, _)| *name)
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    failures: Vec<Classification>,
}

#[derive(Debug, Deserialize)]
struct Classification {
    scenario_id: String,
    category: String,
    #[serde(default)]
    rationale: String,
}

/// Analyzer that turns low-reward runs into a [`FailureReport`].
pub struct FailureAnalyzer {
    llm: Arc<dyn LlmProvider>,
    config: AnalyzerConfig,
}

impl std::fmt::Debug for FailureAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureAnalyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FailureAnalyzer {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "analyzer";

    pub fn new(llm: Arc<dyn LlmProvider>, config: AnalyzerConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Runs that qualify for analysis.
    pub fn low_reward<'a>(&self, evaluations: &[Evaluation<'a>]) -> Vec<Evaluation<'a>> {
        evaluations
            .iter()
            .filter(|e| e.reward.value < self.config.low_reward_threshold)
            .copied()
            .collect()
    }

    /// Analyzes a round's evaluations.
    ///
    /// Without low-reward runs this returns an empty report and the backend
    /// is not consulted.
    pub async fn analyze(
        &self,
        round: u32,
        evaluations: &[Evaluation<'_>],
    ) -> AnalysisResult<FailureReport> {
        let low = self.low_reward(evaluations);
        if low.is_empty() {
            debug!(round, "No low-reward runs to analyze");
            return Ok(FailureReport::empty(round));
        }

        let request = GenerationRequest::new(
            "",
            vec![
                Message::system(ANALYSIS_SYSTEM_PROMPT),
                Message::user(self.build_prompt(&low)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await?;
        let content = response
            .first_content()
            .ok_or_else(|| AnalysisError::BackendParse("Empty LLM response".to_string()))?;

        let report = self.parse_response(round, content, &low)?;
        info!(
            round,
            analyzed = low.len(),
            categories = report.categories.len(),
            top = report.top_weakness().unwrap_or("-"),
            "Failure analysis complete"
        );
        Ok(report)
    }

    fn build_prompt(&self, low: &[Evaluation<'_>]) -> String {
        let runs: String = low.iter().map(render_run).collect();
        ANALYSIS_USER_TEMPLATE
            .replace("{threshold}", &format!("{:.2}", self.config.low_reward_threshold))
            .replace("{runs}", &runs)
    }

    fn parse_response(
        &self,
        round: u32,
        content: &str,
        low: &[Evaluation<'_>],
    ) -> AnalysisResult<FailureReport> {
        let json = try_extract_json_from_response(content)
            .into_result_with_context(content)
            .map_err(|e| AnalysisError::BackendParse(e.to_string()))?;
        let parsed: AnalysisResponse = serde_json::from_str(&json)
            .map_err(|e| AnalysisError::BackendParse(format!("Invalid JSON: {}", e)))?;

        let low_ids: BTreeSet<&str> = low.iter().map(|e| e.scenario.id.as_str()).collect();
        let mut categories: BTreeMap<String, Evidence> = BTreeMap::new();

        for classification in parsed.failures {
            let scenario_id = classification.scenario_id.trim();
            if !low_ids.contains(scenario_id) {
                warn!(
                    round,
                    scenario_id = %scenario_id,
                    "Analyzer classified a scenario that was not submitted"
                );
                continue;
            }
            categories
                .entry(normalize_category(&classification.category))
                .or_default()
                .add(scenario_id.to_string(), classification.rationale);
        }

        if categories.is_empty() {
            return Err(AnalysisError::NoUsableClassifications);
        }

        let categories = bound_categories(categories, self.config.max_categories);
        let classified: BTreeSet<&str> = categories
            .values()
            .flat_map(|e| e.scenario_ids.iter().map(String::as_str))
            .collect();
        let unclassified = low_ids
            .iter()
            .filter(|id| !classified.contains(*id))
            .map(|id| id.to_string())
            .collect();

        Ok(FailureReport {
            round,
            categories,
            unclassified,
        })
    }
}

/// Folds a backend label into a snake_case category, mapping common synonyms.
pub fn normalize_category(raw: &str) -> String {
    let mut slug = String::new();
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');

    match slug {
        "" => OTHER_CATEGORY,
        "wrong_tool" | "tool_choice" | "missing_tool_call" | "missing_tool"
        | "unnecessary_tool_call" | "tool_use" => "tool_selection",
        "arguments" | "bad_arguments" | "argument_error" | "wrong_arguments"
        | "parameter_error" => "argument_formatting",
        "logic" | "planning" | "misinterpretation" | "hallucination" => "reasoning",
        "format" | "formatting" | "output_format" | "malformed_output" | "instructions" => {
            "instruction_following"
        }
        "recovery" | "error_handling" | "tool_error" => "error_recovery",
        other => other,
    }
    .to_string()
}

/// Keeps the strongest categories and merges the rest into [`OTHER_CATEGORY`].
fn bound_categories(
    categories: BTreeMap<String, Evidence>,
    max_categories: usize,
) -> BTreeMap<String, Evidence> {
    if categories.len() <= max_categories {
        return categories;
    }

    let mut ranked: Vec<(String, Evidence)> = categories.into_iter().collect();
    ranked.sort_by(|a, b| b.1.weight().cmp(&a.1.weight()).then_with(|| a.0.cmp(&b.0)));

    let keep = max_categories.saturating_sub(1);
    let mut bounded = BTreeMap::new();
    let mut other = Evidence::default();
    for (i, (name, evidence)) in ranked.into_iter().enumerate() {
        if i < keep && name != OTHER_CATEGORY {
            bounded.insert(name, evidence);
        } else {
            other.merge(evidence);
        }
    }
    bounded.insert(OTHER_CATEGORY.to_string(), other);
    bounded
}

fn render_run(evaluation: &Evaluation<'_>) -> String {
    let scenario = evaluation.scenario;
    let trajectory = evaluation.trajectory;

    let expected = if scenario.expected_tool_calls.is_empty() {
        "none".to_string()
    } else {
        scenario.expected_tool_calls.join(", ")
    };
    let criteria: Vec<String> = scenario
        .success_criteria
        .iter()
        .map(|c| c.describe())
        .collect();

    let mut steps = Vec::new();
    for turn in &trajectory.turns {
        match &turn.action {
            TurnAction::ToolCalls { calls } => {
                for call in calls {
                    steps.push(format!(
                        "  - {}({}) -> {}",
                        call.name,
                        call.arguments,
                        preview(&call.outcome.render(), MAX_RESPONSE_PREVIEW)
                    ));
                }
            }
            TurnAction::Malformed { reason } => {
                steps.push(format!("  - malformed output ({})", reason))
            }
            TurnAction::BackendError { message } => {
                steps.push(format!("  - backend error ({})", message))
            }
            TurnAction::FinalAnswer { .. } => {}
        }
    }
    if steps.is_empty() {
        steps.push("  - no tool calls".to_string());
    }

    format!(
        "### Scenario {id} ({difficulty})\nUser message: {message}\nExpected tool calls: {expected}\nSuccess criteria: {criteria}\nActual steps:\n{steps}\nEnded: {terminal}\nFinal answer: {answer}\nReward: {reward:.2} ({explanation})\n\n",
        id = scenario.id,
        difficulty = scenario.difficulty,
        message = scenario.user_message,
        expected = expected,
        criteria = if criteria.is_empty() {
            "none".to_string()
        } else {
            criteria.join("; ")
        },
        steps = steps.join("\n"),
        terminal = trajectory.terminal,
        answer = trajectory.final_answer.as_deref().unwrap_or("none"),
        reward = evaluation.reward.value,
        explanation = evaluation.reward.explanation,
    )
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::DifficultyLevel;
    use crate::llm::{ReplayProvider, ReplayStep};
    use crate::trajectory::{
        RewardConfig, RewardScorer, TerminalState, ToolCall, TrajectoryCollector, TruncationReason,
    };
    use serde_json::json;

    struct Fixture {
        scenarios: Vec<Scenario>,
        trajectories: Vec<Trajectory>,
        rewards: Vec<RewardSignal>,
    }

    impl Fixture {
        /// `s1` and `s2` fail, `s3` passes.
        fn new() -> Self {
            let scenarios: Vec<Scenario> = ["s1", "s2", "s3"]
                .iter()
                .map(|id| {
                    Scenario::new(*id, "Where is my order?", DifficultyLevel::Easy)
                        .with_expected_tool_calls(["lookup_order"])
                })
                .collect();

            let failed = |id: &str| {
                TrajectoryCollector::new(id, "m").finalize(
                    TerminalState::Truncated {
                        reason: TruncationReason::TurnLimit,
                    },
                    0,
                )
            };
            let mut passed = TrajectoryCollector::new("s3", "m");
            passed.record_tool_calls(
                String::new(),
                vec![ToolCall::from_result(
                    "lookup_order",
                    json!({"id": "1"}),
                    Ok(json!({"status": "shipped"})),
                )],
            );
            passed.record_final_answer(String::new(), "shipped".to_string());

            let trajectories = vec![
                failed("s1"),
                failed("s2"),
                passed.finalize(TerminalState::Completed, 0),
            ];
            let scorer = RewardScorer::new(RewardConfig::default());
            let rewards = trajectories
                .iter()
                .zip(&scenarios)
                .map(|(t, s)| scorer.score(t, s))
                .collect();

            Self {
                scenarios,
                trajectories,
                rewards,
            }
        }

        fn evaluations(&self) -> Vec<Evaluation<'_>> {
            (0..self.scenarios.len())
                .map(|i| Evaluation {
                    scenario: &self.scenarios[i],
                    trajectory: &self.trajectories[i],
                    reward: &self.rewards[i],
                })
                .collect()
        }
    }

    fn analyzer(provider: ReplayProvider) -> FailureAnalyzer {
        FailureAnalyzer::new(Arc::new(provider), AnalyzerConfig::default())
    }

    #[tokio::test]
    async fn test_groups_classifications() {
        let fixture = Fixture::new();
        let provider = ReplayProvider::from_texts([r#"{"failures": [
            {"scenario_id": "s1", "category": "Wrong Tool", "rationale": "Never looked up the order."},
            {"scenario_id": "s2", "category": "tool_selection", "rationale": "never looked up the order."},
            {"scenario_id": "s9", "category": "reasoning", "rationale": "not submitted"}
        ]}"#]);
        let report = analyzer(provider)
            .analyze(2, &fixture.evaluations())
            .await
            .unwrap();

        assert_eq!(report.round, 2);
        assert_eq!(report.categories.len(), 1);
        let evidence = &report.categories["tool_selection"];
        assert_eq!(evidence.weight(), 2);
        assert_eq!(evidence.rationales.len(), 1);
        assert_eq!(report.top_weakness(), Some("tool_selection"));
        assert!(report.unclassified.is_empty());
    }

    #[tokio::test]
    async fn test_no_low_reward_skips_backend() {
        let fixture = Fixture::new();
        let provider = Arc::new(ReplayProvider::new(Vec::new()));
        let analyzer = FailureAnalyzer::new(provider.clone(), AnalyzerConfig::default());
        let evaluations = fixture.evaluations();

        let report = analyzer.analyze(1, &evaluations[2..]).await.unwrap();
        assert!(report.is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_contains_only_low_reward_runs() {
        let fixture = Fixture::new();
        let provider = Arc::new(ReplayProvider::from_texts([
            r#"{"failures": [{"scenario_id": "s1", "category": "reasoning"}]}"#,
        ]));
        let analyzer = FailureAnalyzer::new(provider.clone(), AnalyzerConfig::default());
        let report = analyzer.analyze(1, &fixture.evaluations()).await.unwrap();

        let prompt = provider.requests()[0].messages[1].content.clone();
        assert!(prompt.contains("### Scenario s1"));
        assert!(prompt.contains("### Scenario s2"));
        assert!(!prompt.contains("### Scenario s3"));
        assert_eq!(report.unclassified, vec!["s2".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_output_is_parse_error() {
        let fixture = Fixture::new();
        let err = analyzer(ReplayProvider::from_texts(["The agent did badly."]))
            .analyze(1, &fixture.evaluations())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::BackendParse(_)));

        let err = analyzer(ReplayProvider::from_texts([r#"{"categories": {}}"#]))
            .analyze(1, &fixture.evaluations())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::BackendParse(_)));
    }

    #[tokio::test]
    async fn test_only_unknown_ids_is_unusable() {
        let fixture = Fixture::new();
        let err = analyzer(ReplayProvider::from_texts([
            r#"{"failures": [{"scenario_id": "nope", "category": "reasoning"}]}"#,
        ]))
        .analyze(1, &fixture.evaluations())
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::NoUsableClassifications));
    }

    #[tokio::test]
    async fn test_backend_failure() {
        let fixture = Fixture::new();
        let err = analyzer(ReplayProvider::new(vec![ReplayStep::failure("down")]))
            .analyze(1, &fixture.evaluations())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Backend(_)));
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("Wrong Tool"), "tool_selection");
        assert_eq!(normalize_category("  Error-Handling "), "error_recovery");
        assert_eq!(normalize_category("Context Window!"), "context_window");
        assert_eq!(normalize_category("???"), OTHER_CATEGORY);
    }

    #[test]
    fn test_bound_categories_merges_overflow() {
        let mut categories = BTreeMap::new();
        for (name, ids) in [("a", 3), ("b", 2), ("c", 1)] {
            let mut evidence = Evidence::default();
            for i in 0..ids {
                evidence.add(format!("{}{}", name, i), format!("{} rationale", name));
            }
            categories.insert(name.to_string(), evidence);
        }

        let bounded = bound_categories(categories, 2);
        assert_eq!(bounded.len(), 2);
        assert_eq!(bounded["a"].weight(), 3);
        assert_eq!(bounded[OTHER_CATEGORY].weight(), 3);
        assert_eq!(bounded[OTHER_CATEGORY].rationales.len(), 2);
    }
}
