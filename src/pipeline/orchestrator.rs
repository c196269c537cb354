//! The training loop.
//!
//! Each round moves through `Evaluating → Scoring → Analyzing → Generating →
//! CurriculumSelecting` and appends exactly one [`RoundRecord`]. Analysis or
//! generation failures are recorded as degradations; they never abort the
//! run.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::config::{ForgeConfig, LoopConfig};
use super::history::{Degradation, LoopPhase, RewardStats, RoundHistory, RoundRecord, ScenarioResult};
use crate::agent::AgentDriver;
use crate::agents::{
    Evaluation, FailureAnalyzer, FailureReport, GenerationError, ScenarioGenerator,
};
use crate::curriculum::Curriculum;
use crate::domain::{Domain, Scenario};
use crate::error::ConfigError;
use crate::llm::LlmProvider;
use crate::trajectory::{RewardScorer, Trajectory};

/// Outcome of the generating phase.
struct GenerationOutcome {
    accepted: Vec<Scenario>,
    rejected: usize,
    degradation: Option<Degradation>,
}

/// Runs rounds of evaluate, score, analyze, generate and select.
pub struct ForgeOrchestrator {
    driver: AgentDriver,
    scorer: RewardScorer,
    analyzer: FailureAnalyzer,
    generator: ScenarioGenerator,
    curriculum: Curriculum,
    domain: Domain,
    config: LoopConfig,
    history: RoundHistory,
    phase: LoopPhase,
    next_round: Vec<Arc<Scenario>>,
}

impl std::fmt::Debug for ForgeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeOrchestrator")
            .field("domain", &self.domain.name)
            .field("phase", &self.phase)
            .field("rounds_completed", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl ForgeOrchestrator {
    /// Creates an orchestrator.
    ///
    /// `agent_backend` drives the agent under training; `analysis_backend`
    /// serves the analyzer and generator. They may be the same provider.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(
        domain: Domain,
        agent_backend: Arc<dyn LlmProvider>,
        analysis_backend: Arc<dyn LlmProvider>,
        config: ForgeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let curriculum = Curriculum::new(config.curriculum);
        let round_size = config
            .loop_config
            .round_size
            .unwrap_or(domain.catalog.len());
        let next_round = curriculum.select_next_round(domain.catalog.all(), round_size);

        info!(
            domain = %domain.name,
            scenarios = domain.catalog.len(),
            rounds = config.loop_config.rounds,
            strategy = curriculum.strategy_name(),
            reward = %config.reward.describe(),
            "Orchestrator ready"
        );

        Ok(Self {
            driver: AgentDriver::new(agent_backend, config.agent),
            scorer: RewardScorer::new(config.reward),
            analyzer: FailureAnalyzer::new(Arc::clone(&analysis_backend), config.analyzer),
            generator: ScenarioGenerator::new(analysis_backend, config.generator),
            curriculum,
            domain,
            config: config.loop_config,
            history: RoundHistory::new(),
            phase: LoopPhase::Evaluating,
            next_round,
        })
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == LoopPhase::Done
    }

    pub fn history(&self) -> &RoundHistory {
        &self.history
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    /// Scenarios the next round will evaluate.
    pub fn next_round(&self) -> &[Arc<Scenario>] {
        &self.next_round
    }

    /// Runs every remaining round and returns the history.
    pub async fn run(&mut self) -> &RoundHistory {
        while self.run_round().await.is_some() {}
        &self.history
    }

    /// Runs one round. Returns `None` once the loop is done.
    pub async fn run_round(&mut self) -> Option<&RoundRecord> {
        if self.is_done() {
            return None;
        }

        let round = self.history.len() as u32 + 1;
        let started_at = Utc::now();
        let scenarios = std::mem::take(&mut self.next_round);
        info!(round, scenarios = scenarios.len(), "Round started");

        self.set_phase(round, LoopPhase::Evaluating);
        let trajectories = self.run_agent(&scenarios).await;

        self.set_phase(round, LoopPhase::Scoring);
        let results = self.score(&scenarios, trajectories);
        let stats = RewardStats::from_results(&results);

        let mut degradations = Vec::new();

        self.set_phase(round, LoopPhase::Analyzing);
        let failure_report = self.analyze(round, &scenarios, &results).await;
        let failure_report = match failure_report {
            Ok(report) => Some(report),
            Err(degradation) => {
                degradations.push(degradation);
                None
            }
        };

        self.set_phase(round, LoopPhase::Generating);
        let generation = match &failure_report {
            Some(report) if !report.is_empty() => self.generate(round, report).await,
            _ => GenerationOutcome {
                accepted: Vec::new(),
                rejected: 0,
                degradation: None,
            },
        };
        degradations.extend(generation.degradation);

        self.set_phase(round, LoopPhase::CurriculumSelecting);
        self.curriculum.observe(
            round,
            scenarios
                .iter()
                .zip(&results)
                .map(|(scenario, result)| (scenario.as_ref(), &result.reward)),
        );
        let round_size = self
            .config
            .round_size
            .unwrap_or(self.domain.catalog.len());
        self.next_round = self
            .curriculum
            .select_next_round(self.domain.catalog.all(), round_size);

        let record = RoundRecord {
            round,
            scenario_ids: scenarios.iter().map(|s| s.id.clone()).collect(),
            stats,
            results,
            failure_report,
            generated: generation.accepted,
            drafts_rejected: generation.rejected,
            degradations,
            next_scenario_ids: self.next_round.iter().map(|s| s.id.clone()).collect(),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            round,
            mean_reward = record.stats.mean,
            pass_rate = record.stats.pass_rate,
            generated = record.generated.len(),
            rejected = record.drafts_rejected,
            degraded = record.is_degraded(),
            "Round finished"
        );
        self.history.push(record);

        let plateau = self
            .config
            .plateau
            .is_some_and(|criterion| self.history.is_plateau(&criterion));
        if plateau {
            info!(round, "Mean reward plateaued; stopping");
        }
        if plateau || round >= self.config.rounds {
            self.set_phase(round, LoopPhase::Done);
        } else {
            self.phase = LoopPhase::Evaluating;
        }

        self.history.last()
    }

    /// Runs and scores `scenarios` without touching history or curriculum.
    pub async fn evaluate(&self, scenarios: &[Arc<Scenario>]) -> Vec<ScenarioResult> {
        let trajectories = self.run_agent(scenarios).await;
        self.score(scenarios, trajectories)
    }

    /// Runs the agent on every scenario, at most `concurrency` at a time.
    /// Results are in scenario order.
    async fn run_agent(&self, scenarios: &[Arc<Scenario>]) -> Vec<Trajectory> {
        let semaphore = Semaphore::new(self.config.concurrency);
        let environment = &self.domain.environment;

        let runs = scenarios.iter().map(|scenario| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                self.driver.run(scenario, environment).await
            }
        });
        join_all(runs).await
    }

    fn score(&self, scenarios: &[Arc<Scenario>], trajectories: Vec<Trajectory>) -> Vec<ScenarioResult> {
        scenarios
            .iter()
            .zip(trajectories)
            .map(|(scenario, trajectory)| {
                let reward = self.scorer.score(&trajectory, scenario);
                debug!(
                    scenario_id = %scenario.id,
                    reward = reward.value,
                    passed = reward.passed,
                    terminal = %trajectory.terminal,
                    "Scored trajectory"
                );
                ScenarioResult::new(scenario, trajectory, reward)
            })
            .collect()
    }

    async fn analyze(
        &self,
        round: u32,
        scenarios: &[Arc<Scenario>],
        results: &[ScenarioResult],
    ) -> Result<FailureReport, Degradation> {
        let evaluations: Vec<Evaluation<'_>> = scenarios
            .iter()
            .zip(results)
            .map(|(scenario, result)| Evaluation {
                scenario: scenario.as_ref(),
                trajectory: &result.trajectory,
                reward: &result.reward,
            })
            .collect();

        self.analyzer
            .analyze(round, &evaluations)
            .await
            .map_err(|e| {
                warn!(round, error = %e, "Failure analysis failed; continuing without new insight");
                Degradation::AnalysisFailed(e.to_string())
            })
    }

    async fn generate(&mut self, round: u32, report: &FailureReport) -> GenerationOutcome {
        let drafts: Vec<Result<Scenario, GenerationError>> = self
            .generator
            .generate(report, &self.domain.catalog, &self.domain.environment, round)
            .collect()
            .await;

        let requested = drafts.len();
        let mut accepted = Vec::new();
        let mut rejected = 0;
        let mut backend_failures = Vec::new();

        for draft in drafts {
            match draft {
                Ok(scenario) => match self.domain.catalog.append(scenario) {
                    Ok(added) => accepted.push(added.as_ref().clone()),
                    Err(e) => {
                        warn!(round, error = %e, "Generated scenario not added");
                        rejected += 1;
                    }
                },
                Err(e) => {
                    rejected += 1;
                    if !e.is_draft_rejection() {
                        backend_failures.push(e.to_string());
                    }
                }
            }
        }

        let degradation = backend_failures.first().map(|first| {
            Degradation::GenerationFailed(format!(
                "{} of {} draft requests failed: {}",
                backend_failures.len(),
                requested,
                first
            ))
        });
        if let Some(ref degradation) = degradation {
            warn!(round, ?degradation, "Scenario generation degraded");
        }

        GenerationOutcome {
            accepted,
            rejected,
            degradation,
        }
    }

    fn set_phase(&mut self, round: u32, phase: LoopPhase) {
        debug!(round, from = %self.phase, to = %phase, "Phase transition");
        self.phase = phase;
    }
}
