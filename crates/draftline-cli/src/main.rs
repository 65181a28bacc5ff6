//! Command line entry point.
//!
//! Wires the environment-configured provider set into the aggregator,
//! ranking engine, and pipeline orchestrator, and exposes one
//! subcommand per way of driving them.

mod config;
mod stages;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc, Weekday};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use draftline_core::traits::HistoryStore;
use draftline_core::{
    Aggregator, AggregatorConfig, CircuitBreaker, OrchestratorConfig, PipelineOrchestrator,
    PipelineRun, RankingConfig, RankingEngine, ScheduleRule, Stage, Timeframe, run_on_schedule,
};
use draftline_sources::{ReqwestTransport, Transport};

use crate::stages::{
    FileHistory, FilePublisher, MarkdownWriter, RuleBasedAnalyst, StatsResearcher,
};

type CliOrchestrator = PipelineOrchestrator<
    StatsResearcher,
    RuleBasedAnalyst,
    MarkdownWriter,
    FilePublisher,
    FileHistory,
>;

#[derive(Parser)]
#[command(
    name = "draftline",
    version,
    about = "Most-added player tracking and publishing pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the commands that execute the full pipeline.
#[derive(Args)]
struct RunOpts {
    /// Lookback window, day or week
    #[arg(short, long, env = "DRAFTLINE_TIMEFRAME", default_value = "week")]
    timeframe: Timeframe,

    /// How many players to keep
    #[arg(short = 'n', long, default_value_t = 10)]
    top: usize,

    /// Directory published drafts land in
    #[arg(long, env = "DRAFTLINE_OUT_DIR", default_value = "out")]
    out_dir: PathBuf,

    /// Run history file, JSON lines
    #[arg(
        long,
        env = "DRAFTLINE_HISTORY_FILE",
        default_value = "draftline-history.jsonl"
    )]
    history_file: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect and merge most-added players from every enabled source
    Collect {
        /// Lookback window, day or week
        #[arg(short, long, env = "DRAFTLINE_TIMEFRAME", default_value = "week")]
        timeframe: Timeframe,
    },
    /// Collect, then rank and print the top pickups
    Rank {
        /// Lookback window, day or week
        #[arg(short, long, env = "DRAFTLINE_TIMEFRAME", default_value = "week")]
        timeframe: Timeframe,

        /// How many players to keep
        #[arg(short = 'n', long, default_value_t = 10)]
        top: usize,
    },
    /// Run the whole pipeline once and publish a draft
    Run {
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Publish on a weekly schedule until interrupted
    Schedule {
        /// Weekday the pipeline fires on, e.g. tue
        #[arg(long, default_value = "tue", value_parser = parse_weekday)]
        weekday: Weekday,

        /// Hour of day in the schedule's timezone, 0-23
        #[arg(long, default_value_t = 9)]
        hour: u32,

        /// Timezone as whole hours east of UTC
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        utc_offset: i32,

        #[command(flatten)]
        opts: RunOpts,
    },
    /// Show recent pipeline runs
    History {
        /// Most recent runs to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Run history file, JSON lines
        #[arg(
            long,
            env = "DRAFTLINE_HISTORY_FILE",
            default_value = "draftline-history.jsonl"
        )]
        history_file: PathBuf,
    },
}

fn parse_weekday(value: &str) -> Result<Weekday, String> {
    value
        .parse()
        .map_err(|_| format!("unknown weekday {value:?}, use mon..sun"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("draftline=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Collect { timeframe } => cmd_collect(timeframe).await,
        Commands::Rank { timeframe, top } => cmd_rank(timeframe, top).await,
        Commands::Run { opts } => cmd_run(opts).await,
        Commands::Schedule {
            weekday,
            hour,
            utc_offset,
            opts,
        } => cmd_schedule(weekday, hour, utc_offset, opts).await,
        Commands::History {
            limit,
            history_file,
        } => cmd_history(limit, history_file).await,
    }
}

fn build_aggregator(breaker: CircuitBreaker) -> Result<(Arc<Aggregator>, usize)> {
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
    let sources = config::build_sources(transport)?;
    let enabled = sources.iter().filter(|source| source.is_enabled()).count();
    anyhow::ensure!(enabled > 0, "no sources are enabled; check provider credentials");

    let minimum = config::minimum_sources(enabled)?;
    info!(enabled, minimum, "provider set ready");

    let aggregator = Aggregator::new(
        sources,
        AggregatorConfig {
            minimum_successful_sources: minimum,
            ..AggregatorConfig::default()
        },
        breaker,
    );
    Ok((Arc::new(aggregator), enabled))
}

fn build_orchestrator(opts: RunOpts) -> Result<Arc<CliOrchestrator>> {
    let breaker = CircuitBreaker::default();
    let (aggregator, enabled) = build_aggregator(breaker.clone())?;
    let ranking = RankingEngine::new(RankingConfig {
        top_n: opts.top,
        total_sources: enabled,
        ..RankingConfig::default()
    });

    Ok(Arc::new(PipelineOrchestrator::new(
        aggregator,
        ranking,
        StatsResearcher,
        RuleBasedAnalyst,
        MarkdownWriter,
        FilePublisher::new(opts.out_dir),
        FileHistory::new(opts.history_file),
        breaker,
        OrchestratorConfig {
            timeframe: opts.timeframe,
            ..OrchestratorConfig::default()
        },
    )))
}

async fn cmd_collect(timeframe: Timeframe) -> Result<()> {
    let (aggregator, _) = build_aggregator(CircuitBreaker::default())?;
    let records = aggregator.collect(timeframe).await?;
    info!(players = records.len(), %timeframe, "collection complete");
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn cmd_rank(timeframe: Timeframe, top: usize) -> Result<()> {
    let (aggregator, enabled) = build_aggregator(CircuitBreaker::default())?;
    let records = aggregator.collect(timeframe).await?;

    let engine = RankingEngine::new(RankingConfig {
        top_n: top,
        total_sources: enabled,
        ..RankingConfig::default()
    });
    let outcome = engine.select_top_n(&records);
    for warning in &outcome.warnings {
        warn!(%warning, "ranking");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.summaries)?);
    Ok(())
}

async fn cmd_run(opts: RunOpts) -> Result<()> {
    let orchestrator = build_orchestrator(opts)?;
    let run = orchestrator.run_pipeline().await?;
    print_run(&run);
    anyhow::ensure!(run.succeeded(), "run {} finished {}", run.id, run.outcome);
    Ok(())
}

async fn cmd_schedule(
    weekday: Weekday,
    hour: u32,
    utc_offset: i32,
    opts: RunOpts,
) -> Result<()> {
    let offset = FixedOffset::east_opt(utc_offset * 3600)
        .with_context(|| format!("utc offset {utc_offset} out of range"))?;
    let rule = ScheduleRule::new(weekday, hour, offset)?;
    let orchestrator = build_orchestrator(opts)?;

    let cancel = CancellationToken::new();
    let handle = run_on_schedule(orchestrator.clone(), rule, cancel.clone());
    info!(next = %rule.next_occurrence(Utc::now()), "scheduler running, ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    cancel.cancel();
    if !orchestrator.stop_and_wait().await {
        warn!("active run did not stop before the poll limit");
    }
    handle.await.context("scheduler task panicked")?;
    Ok(())
}

async fn cmd_history(limit: usize, history_file: PathBuf) -> Result<()> {
    let history = FileHistory::new(history_file);
    let runs = history.list(limit).await?;
    if runs.is_empty() {
        println!("no recorded runs");
        return Ok(());
    }
    for run in &runs {
        let artifact = run.published_artifact_id.as_deref().unwrap_or("-");
        println!(
            "{}  {}  {}  stages {}/{}  {}",
            run.started_at.format("%Y-%m-%d %H:%M UTC"),
            run.timeframe,
            run.outcome,
            run.stages_completed.len(),
            Stage::ALL.len(),
            artifact
        );
    }
    Ok(())
}

fn print_run(run: &PipelineRun) {
    println!("run {} ({})", run.id, run.timeframe);
    println!("  outcome:  {}", run.outcome);
    println!("  duration: {}s", run.duration().num_seconds());
    let stages: Vec<&str> = run
        .stages_completed
        .iter()
        .map(|stage| stage.as_str())
        .collect();
    let stages = if stages.is_empty() {
        "none".to_string()
    } else {
        stages.join(", ")
    };
    println!("  stages:   {stages}");
    if let Some(artifact) = &run.published_artifact_id {
        println!("  artifact: {artifact}");
    }
    for warning in &run.warnings {
        println!("  warning:  {warning}");
    }
    for error in &run.errors {
        println!("  error:    {error}");
    }
}
