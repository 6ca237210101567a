//! CLI command definitions for debate_forge.
//!
//! This module provides the command-line interface for running structured
//! multi-agent debates in one shot.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;

use crate::agents::AgentRegistry;
use crate::debate::{CritiquePolicy, DebateConfig, DebateOrchestrator};
use crate::judge::{Judge, LlmJudge, PanelCombine, PanelJudge, PanelMember, Rubric, RuleJudge};
use crate::llm::{OpenAiChatClient, SamplingConfig, DEFAULT_MODEL};
use crate::report::DebateReport;
use crate::storage::{make_run_id, JsonlRunLogger};

/// Default comma-separated roster when none is given.
const DEFAULT_AGENTS: &str = "ConservativeArchitect,OptimizingSystems";

/// Default directory for run logs and reports.
const DEFAULT_OUTPUT_DIR: &str = "./runs";

/// Structured multi-agent debate runner.
#[derive(Parser)]
#[command(name = "debate-forge")]
#[command(about = "Run structured multi-agent LLM debates with rubric-based judging")]
#[command(version)]
#[command(
    long_about = "debate-forge pits a roster of LLM personas against each other over a \
                  question: round 1 proposes, later rounds critique and defend, and a judge \
                  scores the final answers against a weighted rubric.\n\nExample usage:\n  \
                  debate-forge run --question \"Monolith or microservices for an MVP?\" \
                  --rounds 2 --judge llm"
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
    /// Run a debate to a verdict.
    Run(Box<RunArgs>),
}

/// Judge selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JudgeKind {
    /// LLM judge scoring each final answer against the rubric.
    Llm,
    /// Deterministic heuristic judge; no model calls.
    Rule,
    /// Panel of an LLM judge and the heuristic judge, scores averaged.
    Panel,
}

/// Critique targeting selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CritiquePolicyArg {
    /// Every agent critiques every opponent.
    AllOpponents,
    /// Every agent critiques only the currently strongest opponent.
    StrongestOpponent,
}

impl From<CritiquePolicyArg> for CritiquePolicy {
    fn from(value: CritiquePolicyArg) -> Self {
        match value {
            CritiquePolicyArg::AllOpponents => CritiquePolicy::AllOpponents,
            CritiquePolicyArg::StrongestOpponent => CritiquePolicy::StrongestOpponent,
        }
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Json,
    Markdown,
}

/// Arguments for `debate-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The question to debate.
    #[arg(short, long)]
    pub question: String,

    /// Comma-separated registry agent ids forming the roster.
    #[arg(long, default_value = DEFAULT_AGENTS)]
    pub agents: String,

    /// Ad-hoc persona of the form "Name:Instructions"; repeatable, appended
    /// to the roster after the registry agents.
    #[arg(long = "agent-role")]
    pub agent_roles: Vec<String>,

    /// Number of debate rounds (round 1 proposes, later rounds critique and defend).
    #[arg(long, default_value = "2")]
    pub rounds: u32,

    /// Judge to score the final answers.
    #[arg(long, value_enum, default_value = "llm")]
    pub judge: JudgeKind,

    /// Critique targeting policy.
    #[arg(long, value_enum, default_value = "all-opponents")]
    pub critique_policy: CritiquePolicyArg,

    /// Model identifier for agent turns.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Sampling temperature for agent turns, clamped to [0, 2].
    #[arg(long, default_value = "0.2")]
    pub temperature: f64,

    /// Maximum tokens per agent turn.
    #[arg(long, default_value = "800")]
    pub max_tokens: u32,

    /// Fixed sampling seed for backends that support it.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Free-text constraints shown to every agent.
    #[arg(long)]
    pub constraints: Option<String>,

    /// YAML agent registry file; the built-in registry is used when omitted.
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Directory for the JSONL run log and the report.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Report format written next to the run log.
    #[arg(long, value_enum, default_value = "markdown")]
    pub format: ReportFormat,
}

/// Parse CLI arguments without executing a command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and execute the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_debate_command(*args).await,
    }
}

async fn run_debate_command(args: RunArgs) -> anyhow::Result<()> {
    let registry = match &args.registry {
        Some(path) => AgentRegistry::from_path(path)?,
        None => AgentRegistry::builtin(),
    };
    let ids: Vec<String> = args
        .agents
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    let profiles = registry.select(&ids, &args.agent_roles)?;

    let gateway = Arc::new(OpenAiChatClient::from_env()?);

    let mut sampling = SamplingConfig::new(&args.model)
        .with_temperature(args.temperature)
        .with_max_tokens(args.max_tokens);
    if let Some(seed) = args.seed {
        sampling = sampling.with_seed(seed);
    }

    let judge = match args.judge {
        JudgeKind::Llm => Judge::Llm(LlmJudge::new(gateway.clone(), &sampling)),
        JudgeKind::Rule => Judge::Rule(RuleJudge),
        JudgeKind::Panel => Judge::Panel(PanelJudge::new(
            vec![
                PanelMember::Llm(LlmJudge::new(gateway.clone(), &sampling)),
                PanelMember::Rule(RuleJudge),
            ],
            PanelCombine::Mean,
        )?),
    };
    let rubric = Rubric::default_rubric();

    let mut config = DebateConfig::new(&args.question, args.rounds, sampling)
        .with_critique_policy(args.critique_policy.into());
    if let Some(constraints) = &args.constraints {
        config = config.with_constraints(constraints);
    }

    let orchestrator = DebateOrchestrator::new(profiles, gateway, config)?;

    let run_id = make_run_id("debate");
    let mut logger = JsonlRunLogger::create(&args.output_dir, &run_id)?;
    info!(run_id = %run_id, log = %logger.path().display(), "Run log created");

    let outcome = orchestrator.run(&judge, &rubric, &mut logger).await?;

    let report = DebateReport::from_outcome(&args.question, &outcome);
    let (rendered, extension) = match args.format {
        ReportFormat::Json => (report.to_json()?, "json"),
        ReportFormat::Markdown => (report.to_markdown(), "md"),
    };
    let report_path = args.output_dir.join(format!("{}.{}", run_id, extension));
    fs::write(&report_path, &rendered)?;

    println!("{}", rendered);
    info!(
        winner = %report.winner,
        duration_ms = outcome.duration_ms,
        report = %report_path.display(),
        "Debate complete"
    );
    Ok(())
}
