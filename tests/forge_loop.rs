//! End-to-end tests for the training loop, driven by scripted backends.

use std::sync::Arc;

use agent_forge::agents::{AnalyzerConfig, GeneratorConfig};
use agent_forge::curriculum::{CurriculumConfig, StrategyKind};
use agent_forge::domain::{Domain, DomainConfig, ScenarioOrigin};
use agent_forge::llm::ReplayProvider;
use agent_forge::pipeline::{Degradation, ForgeConfig, ForgeOrchestrator, LoopPhase};
use agent_forge::report::{summarize_round, RunReportStorage};
use agent_forge::trajectory::ToolOutcome;
use serde_json::json;

const DOMAIN: &str = r#"
name: orders
tools:
  - name: lookup_order
    description: Look up an order by id
    parameters:
      id: string
    mock_responses:
      order_1: {status: shipped}
      default: {status: unknown}
  - name: cancel_order
    description: Cancel an order by id
    parameters:
      id: string
    mock_responses:
      default: {cancelled: true}
scenarios:
  - id: where-is-order
    user_message: Where is order_1?
    difficulty: easy
    expected_tool_calls: [lookup_order]
  - id: cancel-order
    user_message: Cancel order_2 for me.
    difficulty: medium
    expected_tool_calls: [lookup_order, cancel_order]
"#;

fn domain() -> Domain {
    DomainConfig::from_yaml_str(DOMAIN)
        .expect("domain parses")
        .build()
        .expect("domain builds")
}

/// Every run is analyzed; one draft per round; deterministic selection.
fn config(rounds: u32) -> ForgeConfig {
    ForgeConfig::new()
        .with_rounds(rounds)
        .with_analyzer(AnalyzerConfig::default().with_low_reward_threshold(1.0))
        .with_generator(GeneratorConfig::default().with_max_drafts(1))
        .with_curriculum(CurriculumConfig::default().with_strategy(StrategyKind::Uniform))
}

fn lazy_agent() -> Arc<ReplayProvider> {
    Arc::new(ReplayProvider::repeating(r#"{"final_answer": "done"}"#))
}

fn analysis(failures: &[(&str, &str)]) -> String {
    let failures: Vec<_> = failures
        .iter()
        .map(|(id, category)| {
            json!({
                "scenario_id": id,
                "category": category,
                "rationale": "Answered without calling any tool."
            })
        })
        .collect();
    json!({ "failures": failures }).to_string()
}

fn draft(message: &str) -> String {
    json!({
        "description": "Look up before acting",
        "user_message": message,
        "difficulty": "medium",
        "expected_tool_calls": ["lookup_order"],
        "success_criteria": [{"type": "tool_called", "tool": "lookup_order"}]
    })
    .to_string()
}

#[tokio::test]
async fn test_generated_scenarios_join_next_round() {
    let analysis_backend = Arc::new(ReplayProvider::from_texts([
        analysis(&[
            ("where-is-order", "tool_selection"),
            ("cancel-order", "tool_selection"),
        ]),
        draft("Has order_9 left the warehouse yet?"),
        analysis(&[("gen_r1_tool_selection_1", "tool_selection")]),
        draft("Check whether order_5 was delivered."),
    ]));

    let mut orchestrator =
        ForgeOrchestrator::new(domain(), lazy_agent(), analysis_backend.clone(), config(2))
            .unwrap();

    let first = orchestrator.run_round().await.unwrap().clone();
    assert_eq!(first.round, 1);
    assert_eq!(first.generated.len(), 1);
    let generated = &first.generated[0];
    assert_eq!(generated.id, "gen_r1_tool_selection_1");
    assert_eq!(
        generated.origin,
        ScenarioOrigin::Generated {
            round: 1,
            target_weakness: "tool_selection".to_string()
        }
    );
    assert_eq!(
        first.failure_report.as_ref().unwrap().top_weakness(),
        Some("tool_selection")
    );
    assert!(first.next_scenario_ids.contains(&generated.id));

    orchestrator.run_round().await.unwrap();
    assert!(orchestrator.is_done());
    assert_eq!(orchestrator.phase(), LoopPhase::Done);

    let history = orchestrator.history();
    assert_eq!(history.len(), 2);
    // Earlier rounds are never rewritten.
    assert_eq!(history.records()[0], first);

    let second = &history.records()[1];
    assert_eq!(second.scenario_ids.len(), 3);
    assert!(second
        .scenario_ids
        .contains(&"gen_r1_tool_selection_1".to_string()));
    assert_eq!(second.stats.generated.as_ref().unwrap().count, 1);
    assert_eq!(second.generated[0].id, "gen_r2_tool_selection_1");

    assert_eq!(orchestrator.domain().catalog.len(), 4);
    assert_eq!(analysis_backend.remaining(), 0);
}

#[tokio::test]
async fn test_malformed_analysis_degrades_round() {
    let analysis_backend = Arc::new(ReplayProvider::repeating("I could not decide."));
    let mut orchestrator =
        ForgeOrchestrator::new(domain(), lazy_agent(), analysis_backend, config(2)).unwrap();

    let history = orchestrator.run().await;
    assert_eq!(history.len(), 2);
    for record in history.records() {
        assert!(record.failure_report.is_none());
        assert!(record.generated.is_empty());
        assert!(matches!(
            record.degradations.as_slice(),
            [Degradation::AnalysisFailed(_)]
        ));
        assert_eq!(record.stats.count, 2);
    }
    assert_eq!(orchestrator.domain().catalog.len(), 2);
}

#[tokio::test]
async fn test_generation_backend_failure_degrades_round() {
    let analysis_backend = Arc::new(ReplayProvider::from_texts([analysis(&[(
        "where-is-order",
        "reasoning",
    )])]));
    let mut orchestrator =
        ForgeOrchestrator::new(domain(), lazy_agent(), analysis_backend, config(1)).unwrap();

    let record = orchestrator.run_round().await.unwrap();
    assert!(record.failure_report.is_some());
    assert!(record.generated.is_empty());
    assert!(matches!(
        record.degradations.as_slice(),
        [Degradation::GenerationFailed(_)]
    ));
    assert!(summarize_round(record).degraded);
}

#[tokio::test]
async fn test_invalid_draft_never_enters_catalog() {
    let bad_draft = json!({
        "user_message": "Refund order_3.",
        "difficulty": "hard",
        "expected_tool_calls": ["refund_order"]
    })
    .to_string();
    let analysis_backend = Arc::new(ReplayProvider::from_texts([
        analysis(&[("cancel-order", "tool_selection")]),
        bad_draft,
    ]));
    let mut orchestrator =
        ForgeOrchestrator::new(domain(), lazy_agent(), analysis_backend, config(1)).unwrap();

    let record = orchestrator.run_round().await.unwrap();
    assert!(record.generated.is_empty());
    assert_eq!(record.drafts_rejected, 1);
    assert!(!record.is_degraded());
    assert_eq!(orchestrator.domain().catalog.len(), 2);
}

#[tokio::test]
async fn test_colliding_draft_id_rejected() {
    let colliding = json!({
        "id": "where-is-order",
        "user_message": "Where did order_4 go?",
        "difficulty": "easy",
        "expected_tool_calls": ["lookup_order"]
    })
    .to_string();
    let analysis_backend = Arc::new(ReplayProvider::from_texts([
        analysis(&[("where-is-order", "tool_selection")]),
        colliding,
    ]));
    let mut orchestrator =
        ForgeOrchestrator::new(domain(), lazy_agent(), analysis_backend, config(1)).unwrap();

    let record = orchestrator.run_round().await.unwrap();
    assert_eq!(record.drafts_rejected, 1);

    let seed = orchestrator.domain().catalog.get("where-is-order").unwrap();
    assert_eq!(seed.user_message, "Where is order_1?");
    assert!(!seed.is_generated());
}

#[tokio::test]
async fn test_unknown_tool_call_recorded() {
    let agent = Arc::new(ReplayProvider::from_texts([
        r#"{"tool": "refund_order", "args": {"id": "order_1"}}"#,
        r#"{"final_answer": "refunded"}"#,
    ]));
    let orchestrator = ForgeOrchestrator::new(
        domain(),
        agent,
        Arc::new(ReplayProvider::new(Vec::new())),
        config(1),
    )
    .unwrap();

    let scenario = orchestrator
        .domain()
        .catalog
        .get("where-is-order")
        .cloned()
        .unwrap();
    let results = orchestrator.evaluate(&[scenario]).await;
    let trajectory = &results[0].trajectory;

    assert!(trajectory.is_completed());
    assert_eq!(trajectory.tool_errors(), 1);
    let call = trajectory.tool_calls().next().unwrap();
    assert!(matches!(
        call.outcome,
        ToolOutcome::Error { ref kind, .. } if kind == "unknown_tool"
    ));
    assert!(results[0].reward.value < 1.0);
}

#[tokio::test]
async fn test_plateau_stops_early() {
    let config = ForgeConfig::new()
        .with_rounds(5)
        .with_plateau(1, 0.01)
        .with_analyzer(AnalyzerConfig::default().with_low_reward_threshold(0.0));
    let mut orchestrator = ForgeOrchestrator::new(
        domain(),
        lazy_agent(),
        Arc::new(ReplayProvider::new(Vec::new())),
        config,
    )
    .unwrap();

    let history = orchestrator.run().await;
    assert_eq!(history.len(), 2);
    assert!(orchestrator.is_done());
}

#[tokio::test]
async fn test_round_reports_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let storage = RunReportStorage::new(dir.path());
    let analysis_backend = Arc::new(ReplayProvider::from_texts([
        analysis(&[("where-is-order", "tool_selection")]),
        draft("Is order_7 on its way?"),
    ]));
    let mut orchestrator =
        ForgeOrchestrator::new(domain(), lazy_agent(), analysis_backend, config(1)).unwrap();

    while let Some(record) = orchestrator.run_round().await {
        storage.save_round(record).await.unwrap();
    }
    storage.save_history(orchestrator.history()).await.unwrap();

    assert_eq!(storage.list_rounds().await.unwrap(), vec![1]);
    assert!(storage.generated_path(1).exists());
    let loaded = storage.load_history().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].scenario_ids, orchestrator.history().records()[0].scenario_ids);
    assert_eq!(loaded[0].generated.len(), 1);
}
