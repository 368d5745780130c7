//! scoreloop - accuracy gate, revision and repair loop for a scoring algorithm
//!
//! ## Commands
//!
//! - `init`: write the reference configuration
//! - `run`: revise and repair the algorithm until both gates pass
//! - `evaluate`: run one gate stage, or one event, without remediation
//! - `history`: list recorded revision plans
//! - `memory`: print the agent memory handed to the reasoner

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use scoreloop_core::telemetry::{init_tracing, LogFormat};
use scoreloop_core::{
    load_corpus, AdvisoryMaterial, ApplyOutcome, CommandCollaborators, CommandSimulator,
    CommandSpec, EventId, GateController, GateEvaluator, GateStage, GateVerdict, HistoricalCorpus,
    ProposalJournal, RepairEngine, RevisionEngine, ScoreloopError, ScoringTarget, TuningConfig,
    TuningLoop, DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "scoreloop")]
#[command(version = scoreloop_core::VERSION)]
#[command(
    about = "Gate a scoring algorithm on historical accuracy and revise it until it passes",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./scoreloop.toml when present)
    #[arg(short, long, global = true, env = "SCORELOOP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the reference configuration to scoreloop.toml
    Init {
        /// Directory to write into
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the loop until the final gate passes
    Run,

    /// Simulate one gate stage or a single event, without remediation
    Evaluate {
        /// Gate stage to evaluate (preliminary | final)
        #[arg(
            long,
            value_parser = parse_stage,
            conflicts_with = "event",
            required_unless_present = "event"
        )]
        stage: Option<GateStage>,

        /// Single event id (e.g. a race result URL)
        #[arg(long)]
        event: Option<String>,
    },

    /// Show recorded revision plans, newest last
    History {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print raw journal entries as JSON lines
        #[arg(long)]
        raw: bool,
    },

    /// Print the rendered agent memory
    Memory,
}

fn parse_stage(raw: &str) -> std::result::Result<GateStage, String> {
    raw.parse().map_err(|e: ScoreloopError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::from_env().unwrap_or_default()
    };
    init_tracing(format, level);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Run => cmd_run(&load_config(config)?).await,
        Commands::Evaluate { stage, event } => {
            cmd_evaluate(&load_config(config)?, stage, event).await
        }
        Commands::History { limit, raw } => cmd_history(&load_config(config)?, limit, raw),
        Commands::Memory => cmd_memory(&load_config(config)?),
    }
}

/// Explicit path, else `./scoreloop.toml` if present, else the defaults.
fn load_config(path: Option<&Path>) -> Result<TuningConfig> {
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    let path = match path {
        Some(path) => path,
        None if default_path.exists() => default_path,
        None => {
            info!("no {} found; using the reference configuration", DEFAULT_CONFIG_FILE);
            return Ok(TuningConfig {
                base_dir: PathBuf::from("."),
                ..TuningConfig::default()
            });
        }
    };
    TuningConfig::load(path).with_context(|| format!("Failed to load config {:?}", path))
}

fn open_journal(config: &TuningConfig) -> Result<ProposalJournal> {
    ProposalJournal::open(
        config.resolve(&config.journal.proposal_log),
        config.resolve(&config.journal.agent_memory),
    )
    .context("Failed to open proposal journal")
}

/// Load the corpus and aim the scoring target at its first event.
fn load_target(config: &TuningConfig) -> Result<(Arc<HistoricalCorpus>, ScoringTarget)> {
    let corpus_path = config.resolve(&config.corpus.path);
    let corpus = load_corpus(&corpus_path).context("Failed to load historical corpus")?;
    let probe = corpus
        .first()
        .cloned()
        .context("Historical corpus is empty")?;
    let target = ScoringTarget::new(config.resolve(&config.collaborators.artifact), probe);
    Ok((Arc::new(corpus), target))
}

fn build_evaluator(
    config: &TuningConfig,
    corpus: Arc<HistoricalCorpus>,
    simulator: CommandSimulator,
    cancel: &CancellationToken,
) -> GateEvaluator {
    GateEvaluator::new(corpus, Arc::new(simulator), config.gate.clone())
        .with_retry(config.retry.clone())
        .with_cancellation(cancel.clone())
}

fn build_loop(config: &TuningConfig, cancel: &CancellationToken) -> Result<TuningLoop> {
    let advisory = AdvisoryMaterial::load(
        &config.base_dir,
        &config.advisory.documents,
        &config.advisory.guidance,
    )
    .context("Failed to load advisory material")?;
    let journal = open_journal(config)?;
    let (corpus, target) = load_target(config)?;

    let CommandCollaborators {
        simulator,
        verifier,
        mutator,
        reasoner,
    } = CommandCollaborators::from_config(&config.collaborators, &config.base_dir);
    let simulator = simulator.for_target(&target, &config.runtime);
    let evaluator = build_evaluator(config, corpus, simulator, cancel);

    let mutator = Arc::new(mutator);
    let repair = RepairEngine::new(Arc::new(verifier), mutator.clone(), config.runtime.clone())
        .with_policy(config.repair.clone())
        .with_retry(config.retry.clone())
        .with_cancellation(cancel.clone());
    let revision = RevisionEngine::new(
        Arc::new(reasoner),
        mutator,
        journal,
        advisory,
        config.runtime.clone(),
    )
    .with_retry(config.retry.clone())
    .with_cancellation(cancel.clone());

    let controller = GateController::new(evaluator, repair, revision, target);
    Ok(TuningLoop::new(controller, config.budget.clone()).with_cancellation(cancel.clone()))
}

fn command_simulator(config: &TuningConfig, target: &ScoringTarget) -> CommandSimulator {
    CommandSimulator::new(CommandSpec::new(
        config.collaborators.simulate.clone(),
        &config.base_dir,
    ))
    .for_target(target, &config.runtime)
}

/// Write the reference configuration.
fn cmd_init(dir: &Path, force: bool) -> Result<()> {
    let path = dir.join(DEFAULT_CONFIG_FILE);
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let rendered = TuningConfig::default().to_toml()?;
    std::fs::write(&path, rendered).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Wrote reference configuration to {:?}", path);
    Ok(())
}

/// Run the loop; Ctrl-C cancels it at the next collaborator boundary.
async fn cmd_run(config: &TuningConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let tuning = build_loop(config, &cancel)?;

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            on_signal.cancel();
        }
    });

    let report = tuning.run().await.context("Tuning loop failed")?;
    println!("{}", report.confirmation());
    Ok(())
}

async fn evaluate_stage(config: &TuningConfig, stage: GateStage) -> Result<GateVerdict> {
    let (corpus, target) = load_target(config)?;
    let simulator = command_simulator(config, &target);
    let evaluator = build_evaluator(config, corpus, simulator, &CancellationToken::new());
    Ok(evaluator.evaluate(stage).await?)
}

async fn cmd_evaluate(
    config: &TuningConfig,
    stage: Option<GateStage>,
    event: Option<String>,
) -> Result<()> {
    match (stage, event) {
        (Some(stage), _) => {
            let verdict = evaluate_stage(config, stage).await?;
            println!(
                "{}: {} over {} event(s), threshold {}% -> {}",
                verdict.stage,
                verdict.accuracy,
                verdict.sample_size,
                verdict.threshold,
                if verdict.passed() { "PASS" } else { "FAIL" }
            );
        }
        (None, Some(event)) => {
            // A single-event check needs no corpus; the event is its own probe.
            let event = EventId::new(event);
            let target =
                ScoringTarget::new(config.resolve(&config.collaborators.artifact), event.clone());
            let evaluator = GateEvaluator::new(
                Arc::new(HistoricalCorpus::new(Vec::new())),
                Arc::new(command_simulator(config, &target)),
                config.gate.clone(),
            )
            .with_retry(config.retry.clone());
            let accuracy = evaluator.simulate(std::slice::from_ref(&event)).await?;
            println!("{}: {}", event.key(), accuracy);
        }
        (None, None) => anyhow::bail!("either --stage or --event is required"),
    }
    Ok(())
}

fn cmd_history(config: &TuningConfig, limit: usize, raw: bool) -> Result<()> {
    let journal = open_journal(config)?;
    let entries = journal.history().entries()?;
    let skip = entries.len().saturating_sub(limit);
    let entries = &entries[skip..];

    if raw {
        for entry in entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }
    if entries.is_empty() {
        println!("No revisions recorded yet.");
        return Ok(());
    }

    for entry in entries {
        let status = match &entry.outcome {
            ApplyOutcome::Applied => "applied".to_string(),
            ApplyOutcome::Failed { reason } => format!("failed: {reason}"),
        };
        println!(
            "#{} {} {} at {} [{}] {}",
            entry.seq,
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.stage,
            entry.accuracy,
            entry.short_digest(),
            status
        );
        for line in entry.plan.text().lines() {
            println!("    {line}");
        }
    }
    Ok(())
}

fn cmd_memory(config: &TuningConfig) -> Result<()> {
    let journal = open_journal(config)?;
    print!("{}", journal.memory().render()?);
    Ok(())
}
