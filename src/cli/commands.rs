//! CLI command definitions for agent-forge.
//!
//! `forge` runs the training loop, `eval` scores the agent once without
//! evolving anything, `validate` checks a domain file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::curriculum::{StrategyKind, DEFAULT_ADVANCE_THRESHOLD};
use crate::domain::{Domain, Scenario};
use crate::llm::{LiteLlmClient, LlmProvider, ReplayProvider};
use crate::pipeline::{ForgeConfig, ForgeOrchestrator, RewardStats, ScenarioResult};
use crate::report::{summarize_history, summarize_round, RunReportStorage};
use crate::validation::ScenarioValidator;

/// Default output directory for run reports.
const DEFAULT_OUTPUT_DIR: &str = "./forge-runs";

/// Co-evolutionary training loop for tool-using agents.
#[derive(Parser)]
#[command(name = "agent-forge")]
#[command(about = "Evaluate an agent, diagnose its failures, generate harder scenarios, repeat")]
#[command(version)]
#[command(
    long_about = "agent-forge runs a tool-using agent against simulated tools, scores each run, \
asks a reasoning backend to explain the failures, and grows the scenario catalog with \
scenarios aimed at those weaknesses.\n\nExample usage:\n  agent-forge forge --domain orders.yaml --rounds 5 --output ./forge-runs"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the training loop and write one report per round.
    Forge(ForgeArgs),

    /// Run and score the agent once, without analysis or generation.
    #[command(alias = "evaluate")]
    Eval(EvalArgs),

    /// Load a domain file and report what is wrong with it.
    Validate(ValidateArgs),
}

/// Curriculum strategies selectable from the command line.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    Uniform,
    WeaknessWeighted,
    DifficultyAscending,
    Shuffled,
}

impl StrategyArg {
    fn into_kind(self, seed: Option<u64>) -> anyhow::Result<StrategyKind> {
        if seed.is_some() && self != StrategyArg::Shuffled {
            anyhow::bail!("--seed only applies to --strategy shuffled");
        }
        Ok(match self {
            StrategyArg::Uniform => StrategyKind::Uniform,
            StrategyArg::WeaknessWeighted => StrategyKind::WeaknessWeighted,
            StrategyArg::DifficultyAscending => StrategyKind::DifficultyAscending {
                advance_threshold: DEFAULT_ADVANCE_THRESHOLD,
            },
            StrategyArg::Shuffled => StrategyKind::Shuffled {
                seed: seed.unwrap_or_default(),
            },
        })
    }
}

/// Backend selection shared by `forge` and `eval`.
#[derive(clap::Args, Debug, Clone)]
pub struct BackendArgs {
    /// Model for the agent under training (defaults to the backend's model).
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Serve agent responses from a replay file instead of a live backend.
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Serve analyzer and generator responses from a replay file.
    #[arg(long)]
    pub analysis_replay: Option<PathBuf>,

    /// OpenRouter API key (can also be set via OPENROUTER_API_KEY env var).
    /// Without it the backend is read from LITELLM_API_BASE.
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,
}

/// Arguments for `agent-forge forge`.
#[derive(Parser, Debug)]
pub struct ForgeArgs {
    /// Domain file (YAML) with tools and seed scenarios.
    #[arg(short = 'd', long)]
    pub domain: PathBuf,

    #[command(flatten)]
    pub backend: BackendArgs,

    /// Number of rounds (overrides FORGE_ROUNDS).
    #[arg(short = 'r', long)]
    pub rounds: Option<u32>,

    /// Scenarios per round (overrides FORGE_ROUND_SIZE).
    #[arg(long)]
    pub round_size: Option<usize>,

    /// Scenarios run concurrently (overrides FORGE_CONCURRENCY).
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Curriculum strategy (overrides FORGE_STRATEGY).
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Shuffle seed, for the shuffled strategy.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output directory for round reports.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `agent-forge eval`.
#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Domain file (YAML) with tools and seed scenarios.
    #[arg(short = 'd', long)]
    pub domain: PathBuf,

    #[command(flatten)]
    pub backend: BackendArgs,

    /// Only run these scenarios (repeatable). Defaults to the whole catalog.
    #[arg(short = 's', long = "scenario")]
    pub scenarios: Vec<String>,

    /// Scenarios run concurrently.
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Write the full results (trajectories included) to this file.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `agent-forge validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Domain file (YAML) to check.
    #[arg(short = 'd', long)]
    pub domain: PathBuf,

    /// Also check a JSON array of scenarios (e.g. a generated round file)
    /// against the domain's tools.
    #[arg(long)]
    pub scenarios: Option<PathBuf>,
}

/// Parse CLI arguments and return the Cli struct.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Forge(args) => run_forge_command(args).await,
        Commands::Eval(args) => run_eval_command(args).await,
        Commands::Validate(args) => run_validate_command(args),
    }
}

// ============================================================================
// Backends
// ============================================================================

fn build_live_backend(api_key: Option<String>) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let client = match api_key {
        Some(key) => LiteLlmClient::new_with_defaults(key),
        None => LiteLlmClient::from_env(),
    }
    .map_err(|e| {
        anyhow::anyhow!(
            "No reasoning backend configured; pass --api-key, set LITELLM_API_BASE, or use --replay: {}",
            e
        )
    })?;
    Ok(Arc::new(client))
}

fn build_replay_backend(path: &Path) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let provider = ReplayProvider::from_file(path)
        .with_context(|| format!("Failed to load replay file {}", path.display()))?;
    info!(path = %path.display(), steps = provider.remaining(), "Using replay backend");
    Ok(Arc::new(provider))
}

/// Returns `(agent_backend, analysis_backend)`.
fn build_backends(
    args: &BackendArgs,
) -> anyhow::Result<(Arc<dyn LlmProvider>, Arc<dyn LlmProvider>)> {
    let needs_live = args.replay.is_none() || args.analysis_replay.is_none();
    let live = if needs_live {
        Some(build_live_backend(args.api_key.clone())?)
    } else {
        None
    };

    let pick = |replay: &Option<PathBuf>| -> anyhow::Result<Arc<dyn LlmProvider>> {
        match (replay, &live) {
            (Some(path), _) => build_replay_backend(path),
            (None, Some(live)) => Ok(Arc::clone(live)),
            (None, None) => anyhow::bail!("No backend available"),
        }
    };

    Ok((pick(&args.replay)?, pick(&args.analysis_replay)?))
}

fn load_domain(path: &Path) -> anyhow::Result<Domain> {
    Domain::load(path).with_context(|| format!("Failed to load domain {}", path.display()))
}

fn base_config(backend: &BackendArgs) -> anyhow::Result<ForgeConfig> {
    let mut config = ForgeConfig::from_env()?;
    if let Some(ref model) = backend.model {
        config.agent = config.agent.with_model(model.clone());
    }
    Ok(config)
}

// ============================================================================
// forge
// ============================================================================

#[derive(Debug, Serialize)]
struct ForgeOutput {
    status: String,
    domain: String,
    rounds: usize,
    catalog_size: usize,
    output: String,
    summaries: Vec<crate::report::RoundSummary>,
}

async fn run_forge_command(args: ForgeArgs) -> anyhow::Result<()> {
    let domain = load_domain(&args.domain)?;
    let (agent_backend, analysis_backend) = build_backends(&args.backend)?;

    let mut config = base_config(&args.backend)?;
    if let Some(rounds) = args.rounds {
        config = config.with_rounds(rounds);
    }
    if let Some(round_size) = args.round_size {
        config = config.with_round_size(round_size);
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(strategy) = args.strategy {
        config.curriculum = config.curriculum.with_strategy(strategy.into_kind(args.seed)?);
    } else if args.seed.is_some() {
        anyhow::bail!("--seed requires --strategy shuffled");
    }

    let mut orchestrator =
        ForgeOrchestrator::new(domain, agent_backend, analysis_backend, config)?;
    let storage = RunReportStorage::new(&args.output);

    info!(
        domain = %orchestrator.domain().name,
        output = %args.output.display(),
        "Starting training loop"
    );

    while let Some(record) = orchestrator.run_round().await {
        let path = storage
            .save_round(record)
            .await
            .with_context(|| format!("Failed to save round {}", record.round))?;
        let summary = summarize_round(record);
        if summary.degraded {
            warn!(path = %path.display(), "{}", summary);
        } else {
            info!(path = %path.display(), "{}", summary);
        }
    }

    let history = orchestrator.history();
    let history_path = storage.save_history(history).await?;
    let summaries = summarize_history(history);

    if args.json {
        let output = ForgeOutput {
            status: "completed".to_string(),
            domain: orchestrator.domain().name.clone(),
            rounds: history.len(),
            catalog_size: orchestrator.domain().catalog.len(),
            output: args.output.display().to_string(),
            summaries,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Training loop finished: {} rounds", history.len());
        for summary in &summaries {
            println!("  {}", summary);
        }
        println!(
            "Catalog: {} scenarios ({} seed)",
            orchestrator.domain().catalog.len(),
            orchestrator
                .domain()
                .catalog
                .all()
                .iter()
                .filter(|s| !s.is_generated())
                .count()
        );
        println!("History: {}", history_path.display());
    }

    Ok(())
}

// ============================================================================
// eval
// ============================================================================

#[derive(Debug, Serialize)]
struct EvalEntry {
    scenario_id: String,
    difficulty: String,
    reward: f64,
    passed: bool,
    terminal: String,
    explanation: String,
}

#[derive(Debug, Serialize)]
struct EvalOutput {
    status: String,
    stats: RewardStats,
    results: Vec<EvalEntry>,
}

async fn run_eval_command(args: EvalArgs) -> anyhow::Result<()> {
    let domain = load_domain(&args.domain)?;
    let selected = select_scenarios(&domain, &args.scenarios)?;
    let (agent_backend, analysis_backend) = build_backends(&args.backend)?;

    let mut config = base_config(&args.backend)?;
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }

    let orchestrator = ForgeOrchestrator::new(domain, agent_backend, analysis_backend, config)?;
    info!(scenarios = selected.len(), "Evaluating agent");
    let results = orchestrator.evaluate(&selected).await;
    let stats = RewardStats::from_results(&results);

    if let Some(ref path) = args.output {
        write_results(path, &results)?;
        info!(path = %path.display(), "Wrote evaluation results");
    }

    let entries: Vec<EvalEntry> = results
        .iter()
        .map(|r| EvalEntry {
            scenario_id: r.scenario_id.clone(),
            difficulty: r.difficulty.to_string(),
            reward: r.reward.value,
            passed: r.reward.passed,
            terminal: r.trajectory.terminal.to_string(),
            explanation: r.reward.explanation.clone(),
        })
        .collect();

    if args.json {
        let output = EvalOutput {
            status: "completed".to_string(),
            stats,
            results: entries,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for entry in &entries {
            println!(
                "  [{}] {} ({}): {:.3} {}",
                if entry.passed { "PASS" } else { "FAIL" },
                entry.scenario_id,
                entry.difficulty,
                entry.reward,
                entry.terminal
            );
        }
        println!(
            "Mean reward {:.3}, pass rate {:.0}% over {} scenarios",
            stats.mean,
            stats.pass_rate * 100.0,
            stats.count
        );
    }

    Ok(())
}

fn select_scenarios(domain: &Domain, ids: &[String]) -> anyhow::Result<Vec<Arc<Scenario>>> {
    if ids.is_empty() {
        return Ok(domain.catalog.all().to_vec());
    }
    ids.iter()
        .map(|id| {
            domain
                .catalog
                .get(id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Unknown scenario: {}", id))
        })
        .collect()
}

fn write_results(path: &Path, results: &[ScenarioResult]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(results)?)?;
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let domain = load_domain(&args.domain)?;
    println!(
        "Domain '{}': {} tools, {} scenarios",
        domain.name,
        domain.environment.tool_names().count(),
        domain.catalog.len()
    );
    print!("{}", domain.environment.describe_tools());
    println!();

    let Some(ref path) = args.scenarios else {
        return Ok(());
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let scenarios: Vec<Scenario> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a JSON array of scenarios", path.display()))?;

    let validator = ScenarioValidator::for_environment(&domain.environment);
    let mut invalid = 0usize;
    for scenario in &scenarios {
        let result = validator.validate(scenario);
        for warning in &result.warnings {
            warn!(scenario_id = %scenario.id, "{}", warning);
        }
        if result.valid {
            println!("  [OK] {}", scenario.id);
        } else {
            invalid += 1;
            println!("  [INVALID] {}: {}", scenario.id, result.error_messages().join("; "));
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} scenarios are invalid", invalid, scenarios.len());
    }
    println!("All {} scenarios are valid", scenarios.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forge_args() {
        let cli = Cli::try_parse_from([
            "agent-forge",
            "forge",
            "--domain",
            "orders.yaml",
            "--rounds",
            "4",
            "--strategy",
            "shuffled",
            "--seed",
            "9",
            "--replay",
            "agent.json",
        ])
        .unwrap();

        let Commands::Forge(args) = cli.command else {
            panic!("expected forge");
        };
        assert_eq!(args.rounds, Some(4));
        assert_eq!(args.strategy, Some(StrategyArg::Shuffled));
        assert_eq!(args.backend.replay, Some(PathBuf::from("agent.json")));
        assert_eq!(args.output, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_strategy_arg_into_kind() {
        assert_eq!(
            StrategyArg::Shuffled.into_kind(Some(3)).unwrap(),
            StrategyKind::Shuffled { seed: 3 }
        );
        assert_eq!(
            StrategyArg::Uniform.into_kind(None).unwrap(),
            StrategyKind::Uniform
        );
        assert!(StrategyArg::Uniform.into_kind(Some(3)).is_err());
    }

    #[test]
    fn test_eval_scenarios_repeatable() {
        let cli = Cli::try_parse_from([
            "agent-forge",
            "eval",
            "-d",
            "orders.yaml",
            "-s",
            "a",
            "-s",
            "b",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let Commands::Eval(args) = cli.command else {
            panic!("expected eval");
        };
        assert_eq!(args.scenarios, vec!["a", "b"]);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_validate_requires_domain() {
        assert!(Cli::try_parse_from(["agent-forge", "validate"]).is_err());
    }
}
