//! Scenario generator: drafts new scenarios aimed at reported weaknesses.
//!
//! Drafts come from the backend and are untrusted. Each one is checked
//! against the tool set and scenario schema, against existing ids, and
//! against existing content before it is yielded. Rejected drafts are
//! dropped, never repaired.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::analyzer_agent::{Evidence, FailureReport};
use super::error::{GenerationError, GenerationResult};
use crate::difficulty::DifficultyLevel;
use crate::domain::{Scenario, ScenarioCatalog, ScenarioOrigin, SuccessCriterion};
use crate::environment::SimulationEnvironment;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::utils::try_extract_json_from_response;
use crate::validation::ScenarioValidator;

/// Failing examples shown per category.
const MAX_EXAMPLES: usize = 3;

const GENERATION_SYSTEM_PROMPT: &str = r#"You design test scenarios for a tool-using agent.

Each scenario is one user request that the agent must solve with the available tools.
A good scenario targets a specific weakness, is solvable with the listed tools only,
and states checkable expectations.

Output Format:
You MUST respond with ONLY a JSON object in this exact format:
{
  "description": "<what the scenario exercises>",
  "user_message": "<the request sent to the agent>",
  "difficulty": "easy|medium|hard",
  "expected_tool_calls": ["<tool name>", ...],
  "success_criteria": [
    {"type": "tool_called", "tool": "<tool name>"},
    {"type": "answer_contains", "text": "<text>"}
  ]
}

Supported criterion types: tool_called, tool_not_called, response_contains,
answer_contains, answer_matches, completed, no_tool_errors.
Only reference tools from the list. Do not include any text outside the JSON object."#;

const GENERATION_USER_TEMPLATE: &str = r#"## Available Tools

{tools}
## Target Weakness

Category: {category}
Observed failures:
{rationales}

## Scenarios the agent failed

{examples}
Write one NEW scenario that exercises the same weakness in a different situation.
Do not repeat any of the user messages above."#;

/// Configuration for the scenario generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Drafts requested per round, spread across report categories.
    pub max_drafts: usize,
    /// Temperature for LLM generation.
    pub temperature: f64,
    /// Maximum tokens for LLM response.
    pub max_tokens: u32,
    /// Prefix for assigned scenario ids.
    pub id_prefix: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_drafts: 3,
            temperature: 0.7,
            max_tokens: 1500,
            id_prefix: "gen".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_drafts(mut self, max_drafts: usize) -> Self {
        self.max_drafts = max_drafts;
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

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        if !crate::validation::is_valid_id(&self.id_prefix) {
            return Err(crate::error::ConfigError::ValidationFailed(format!(
                "id_prefix '{}' must be alphanumeric, '-' or '_'",
                self.id_prefix
            )));
        }
        Ok(())
    }
}

/// Raw draft as the backend returns it; every field is checked before use.
#[derive(Debug, Default, Deserialize)]
struct ScenarioDraft {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    user_message: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    expected_tool_calls: Vec<String>,
    #[serde(default)]
    success_criteria: Vec<Value>,
}

/// Generator that proposes scenarios for a [`FailureReport`].
pub struct ScenarioGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GeneratorConfig,
}

impl std::fmt::Debug for ScenarioGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ScenarioGenerator {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "generator";

    pub fn new(llm: Arc<dyn LlmProvider>, config: GeneratorConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Target category for each draft, in request order.
    ///
    /// Categories are visited by descending evidence, round-robin, until
    /// `max_drafts` targets are planned.
    pub fn plan_targets<'r>(&self, report: &'r FailureReport) -> Vec<(&'r str, &'r Evidence)> {
        let ranked = report.ranked_categories();
        if ranked.is_empty() {
            return Vec::new();
        }
        ranked
            .iter()
            .cycle()
            .take(self.config.max_drafts)
            .copied()
            .collect()
    }

    /// Lazily drafts scenarios for `report`.
    ///
    /// Each item is either an accepted scenario or the reason one draft was
    /// dropped. Accepted scenarios never collide with `catalog` ids or with
    /// each other, and always pass validation against `environment`. The
    /// stream issues one backend call per planned draft and cannot be
    /// restarted.
    pub fn generate<'a>(
        &'a self,
        report: &'a FailureReport,
        catalog: &'a ScenarioCatalog,
        environment: &'a SimulationEnvironment,
        round: u32,
    ) -> impl Stream<Item = GenerationResult<Scenario>> + 'a {
        stream! {
            let validator = ScenarioValidator::for_environment(environment);
            let mut seen_ids: HashSet<String> = HashSet::new();
            let mut fingerprints: HashMap<String, String> = catalog
                .all()
                .iter()
                .map(|s| (content_fingerprint(&s.user_message), s.id.clone()))
                .collect();
            let mut per_category: HashMap<&str, usize> = HashMap::new();

            for (category, evidence) in self.plan_targets(report) {
                let n = per_category.entry(category).or_insert(0);
                *n += 1;
                let assigned_id = format!(
                    "{}_r{}_{}_{}",
                    self.config.id_prefix,
                    round,
                    category,
                    n
                );

                let content = match self.request_draft(category, evidence, catalog, environment).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(round, category, error = %e, "Scenario draft request failed");
                        yield Err(e);
                        continue;
                    }
                };

                let result = self
                    .accept_draft(&content, assigned_id, category, round, &validator)
                    .and_then(|scenario| {
                        if catalog.contains(&scenario.id) || seen_ids.contains(&scenario.id) {
                            return Err(GenerationError::IdCollision { id: scenario.id });
                        }
                        let fingerprint = content_fingerprint(&scenario.user_message);
                        if let Some(existing) = fingerprints.get(&fingerprint) {
                            return Err(GenerationError::DuplicateContent {
                                id: scenario.id,
                                existing: existing.clone(),
                            });
                        }
                        fingerprints.insert(fingerprint, scenario.id.clone());
                        seen_ids.insert(scenario.id.clone());
                        Ok(scenario)
                    });

                match &result {
                    Ok(scenario) => debug!(round, scenario_id = %scenario.id, category, "Accepted generated scenario"),
                    Err(e) => warn!(round, category, reason = %e, "Dropped generated scenario draft"),
                }
                yield result;
            }
        }
    }

    async fn request_draft(
        &self,
        category: &str,
        evidence: &Evidence,
        catalog: &ScenarioCatalog,
        environment: &SimulationEnvironment,
    ) -> GenerationResult<String> {
        let request = GenerationRequest::new(
            "",
            vec![
                Message::system(GENERATION_SYSTEM_PROMPT),
                Message::user(self.build_prompt(category, evidence, catalog, environment)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await?;
        response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| GenerationError::BackendParse("Empty LLM response".to_string()))
    }

    fn build_prompt(
        &self,
        category: &str,
        evidence: &Evidence,
        catalog: &ScenarioCatalog,
        environment: &SimulationEnvironment,
    ) -> String {
        let rationales = if evidence.rationales.is_empty() {
            "- (no rationale given)".to_string()
        } else {
            evidence
                .rationales
                .iter()
                .map(|r| format!("- {}", r))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let examples: String = evidence
            .scenario_ids
            .iter()
            .filter_map(|id| catalog.get(id))
            .take(MAX_EXAMPLES)
            .map(|s| {
                format!(
                    "- [{}] {}\n  expected tools: {}\n",
                    s.difficulty,
                    s.user_message,
                    if s.expected_tool_calls.is_empty() {
                        "none".to_string()
                    } else {
                        s.expected_tool_calls.join(", ")
                    }
                )
            })
            .collect();

        GENERATION_USER_TEMPLATE
            .replace("{tools}", &environment.describe_tools())
            .replace("{category}", category)
            .replace("{rationales}", &rationales)
            .replace("{examples}", &examples)
    }

    /// Parses and validates one draft. Never repairs it.
    fn accept_draft(
        &self,
        content: &str,
        assigned_id: String,
        category: &str,
        round: u32,
        validator: &ScenarioValidator,
    ) -> GenerationResult<Scenario> {
        let json = try_extract_json_from_response(content)
            .into_result_with_context(content)
            .map_err(|e| GenerationError::BackendParse(e.to_string()))?;
        let draft: ScenarioDraft = serde_json::from_str(&json)
            .map_err(|e| GenerationError::BackendParse(format!("Invalid JSON: {}", e)))?;

        let id = draft
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or(assigned_id);

        let mut errors = Vec::new();
        let user_message = match draft.user_message {
            Some(message) => message,
            None => {
                errors.push("user_message: missing".to_string());
                String::new()
            }
        };
        let difficulty = match draft.difficulty.as_deref() {
            Some(raw) => DifficultyLevel::parse(raw).unwrap_or_else(|| {
                errors.push(format!("difficulty: unknown tier '{}'", raw));
                DifficultyLevel::Medium
            }),
            None => {
                errors.push("difficulty: missing".to_string());
                DifficultyLevel::Medium
            }
        };
        let mut criteria = Vec::with_capacity(draft.success_criteria.len());
        for (i, raw) in draft.success_criteria.into_iter().enumerate() {
            match serde_json::from_value::<SuccessCriterion>(raw) {
                Ok(criterion) => criteria.push(criterion),
                Err(e) => errors.push(format!("success_criteria[{}]: {}", i, e)),
            }
        }

        let mut scenario = Scenario::new(id, user_message, difficulty)
            .with_description(draft.description)
            .with_expected_tool_calls(draft.expected_tool_calls)
            .with_origin(ScenarioOrigin::Generated {
                round,
                target_weakness: category.to_string(),
            });
        scenario.success_criteria = criteria;

        // Seed scenarios may be open-ended; a generated one must be checkable.
        if scenario.expected_tool_calls.is_empty() && scenario.success_criteria.is_empty() {
            errors.push("expected_tool_calls: no expected calls or success criteria".to_string());
        }

        let result = validator.validate(&scenario);
        errors.extend(result.error_messages());
        if !errors.is_empty() {
            return Err(GenerationError::Validation {
                id: scenario.id,
                errors,
            });
        }
        Ok(scenario)
    }
}

/// SHA-256 of the normalised user message (lowercase, collapsed whitespace).
pub fn content_fingerprint(user_message: &str) -> String {
    let normalized = user_message
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolSpec;
    use crate::llm::{ReplayProvider, ReplayStep};
    use futures::StreamExt;

    fn environment() -> SimulationEnvironment {
        SimulationEnvironment::new(vec![
            ToolSpec::new("lookup_order", "Look up an order"),
            ToolSpec::new("cancel_order", "Cancel an order"),
        ])
        .unwrap()
    }

    fn catalog() -> ScenarioCatalog {
        let mut catalog = ScenarioCatalog::new();
        catalog
            .append(
                Scenario::new("s1", "Where is order 1?", DifficultyLevel::Easy)
                    .with_expected_tool_calls(["lookup_order"]),
            )
            .unwrap();
        catalog
    }

    fn report() -> FailureReport {
        let mut report = FailureReport::empty(1);
        let mut evidence = Evidence::default();
        evidence.scenario_ids.insert("s1".to_string());
        evidence.rationales.push("Skipped the lookup.".to_string());
        report.categories.insert("tool_selection".to_string(), evidence);
        report
    }

    fn draft(message: &str) -> String {
        serde_json::json!({
            "description": "cancel flow",
            "user_message": message,
            "difficulty": "medium",
            "expected_tool_calls": ["lookup_order", "cancel_order"],
            "success_criteria": [{"type": "tool_called", "tool": "cancel_order"}]
        })
        .to_string()
    }

    async fn collect(
        provider: ReplayProvider,
        config: GeneratorConfig,
        catalog: &ScenarioCatalog,
    ) -> Vec<GenerationResult<Scenario>> {
        let generator = ScenarioGenerator::new(Arc::new(provider), config);
        let report = report();
        let env = environment();
        generator.generate(&report, catalog, &env, 1).collect().await
    }

    #[tokio::test]
    async fn test_accepts_valid_drafts() {
        let provider = ReplayProvider::from_texts([draft("Cancel order 7."), draft("Cancel order 8 please.")]);
        let results = collect(provider, GeneratorConfig::default().with_max_drafts(2), &catalog()).await;

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.id, "gen_r1_tool_selection_1");
        assert_eq!(
            first.origin,
            ScenarioOrigin::Generated {
                round: 1,
                target_weakness: "tool_selection".to_string()
            }
        );
        assert_eq!(results[1].as_ref().unwrap().id, "gen_r1_tool_selection_2");
    }

    #[tokio::test]
    async fn test_unknown_tool_draft_dropped() {
        let bad = serde_json::json!({
            "user_message": "Refund order 3.",
            "difficulty": "hard",
            "expected_tool_calls": ["refund_order"]
        })
        .to_string();
        let results = collect(
            ReplayProvider::from_texts([bad]),
            GeneratorConfig::default().with_max_drafts(1),
            &catalog(),
        )
        .await;
        assert!(matches!(results[0], Err(GenerationError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_unverifiable_draft_dropped() {
        let open_ended = r#"{"user_message": "Tell me a joke.", "difficulty": "easy"}"#;
        let results = collect(
            ReplayProvider::from_texts([open_ended]),
            GeneratorConfig::default().with_max_drafts(1),
            &catalog(),
        )
        .await;
        match &results[0] {
            Err(GenerationError::Validation { errors, .. }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("expected_tool_calls"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_fields_and_bad_tier_dropped() {
        let bad = r#"{"difficulty": "extreme", "expected_tool_calls": ["lookup_order"]}"#;
        let results = collect(
            ReplayProvider::from_texts([bad]),
            GeneratorConfig::default().with_max_drafts(1),
            &catalog(),
        )
        .await;
        match &results[0] {
            Err(GenerationError::Validation { errors, .. }) => {
                assert!(errors.iter().any(|e| e.starts_with("user_message")));
                assert!(errors.iter().any(|e| e.contains("unknown tier 'extreme'")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_id_collision_rejected() {
        let colliding = serde_json::json!({
            "id": "s1",
            "user_message": "Check order 99.",
            "difficulty": "easy",
            "expected_tool_calls": ["lookup_order"]
        })
        .to_string();
        let results = collect(
            ReplayProvider::from_texts([colliding]),
            GeneratorConfig::default().with_max_drafts(1),
            &catalog(),
        )
        .await;
        assert!(matches!(&results[0], Err(GenerationError::IdCollision { id }) if id == "s1"));
    }

    #[tokio::test]
    async fn test_duplicate_content_rejected() {
        let provider = ReplayProvider::from_texts([
            draft("WHERE is   order 1?"),
            draft("Cancel order 5."),
            draft("cancel order 5."),
        ]);
        let results = collect(provider, GeneratorConfig::default(), &catalog()).await;

        assert!(matches!(&results[0], Err(GenerationError::DuplicateContent { existing, .. }) if existing == "s1"));
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(GenerationError::DuplicateContent { .. })));
    }

    #[tokio::test]
    async fn test_backend_failure_yields_error_and_continues() {
        let provider = ReplayProvider::new(vec![
            ReplayStep::failure("down"),
            ReplayStep::content(draft("Cancel order 6.")),
        ]);
        let results = collect(provider, GeneratorConfig::default().with_max_drafts(2), &catalog()).await;
        assert!(matches!(results[0], Err(GenerationError::Backend(_))));
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn test_empty_report_generates_nothing() {
        let provider = Arc::new(ReplayProvider::new(Vec::new()));
        let generator = ScenarioGenerator::new(provider.clone(), GeneratorConfig::default());
        let report = FailureReport::empty(1);
        let env = environment();
        let catalog = catalog();
        let results: Vec<_> = generator.generate(&report, &catalog, &env, 1).collect().await;
        assert!(results.is_empty());
        assert!(provider.requests().is_empty());
    }

    #[test]
    fn test_plan_targets_round_robin() {
        let mut report = report();
        let mut evidence = Evidence::default();
        evidence.scenario_ids.insert("s2".to_string());
        report.categories.insert("reasoning".to_string(), evidence);
        report
            .categories
            .get_mut("tool_selection")
            .unwrap()
            .scenario_ids
            .insert("s3".to_string());

        let generator = ScenarioGenerator::new(
            Arc::new(ReplayProvider::new(Vec::new())),
            GeneratorConfig::default(),
        );
        let targets: Vec<&str> = generator
            .plan_targets(&report)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(targets, vec!["tool_selection", "reasoning", "tool_selection"]);
    }

    #[test]
    fn test_content_fingerprint_normalizes() {
        assert_eq!(
            content_fingerprint("Where is  order 1?"),
            content_fingerprint("where is order 1?")
        );
        assert_ne!(content_fingerprint("a"), content_fingerprint("b"));
    }
}
