//! Evalboard - evaluation leaderboard CLI
//!
//! The `evalboard` command records model scores, drives the run/eval
//! lifecycle for manual use, and prints leaderboards and history as JSON.
//!
//! ## Commands
//!
//! - `scores`: record, submit and inspect reported score snapshots
//! - `runs`: create and finish runs, inspect run-derived leaderboards
//! - `evals`: create and finish evals inside a run
//! - `maintenance`: auto-fail runs stuck in pending or running

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use evalboard_core::{
    experiment_filter, parse_experiment, BoardConfig, NewEval, NewRun,
    NewScoreSnapshot, ReadScope, RunBoard, RunId, ScoreBoard, SurrealHandle, TimeRange,
};
use evalboard_state::{EvalId, RunStore, SurrealRunStore, SurrealScoreStore};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "evalboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Rolling evaluation leaderboard", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Use a throwaway in-memory database instead of the configured one
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reported score snapshots
    Scores {
        #[command(subcommand)]
        action: ScoresAction,
    },

    /// Evaluation runs and run-derived scores
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },

    /// Evals inside a run
    Evals {
        #[command(subcommand)]
        action: EvalsAction,
    },

    /// Housekeeping tasks
    Maintenance {
        #[command(subcommand)]
        action: MaintenanceAction,
    },
}

/// Cohort selection shared by read commands.
#[derive(Args, Clone, Default)]
struct CohortArgs {
    /// Experiment tag (omit for the default cohort)
    #[arg(long)]
    experiment: Option<String>,
}

#[derive(Subcommand)]
enum ScoresAction {
    /// Append a score snapshot
    Record {
        #[arg(long)]
        model: String,

        /// Overall score for this run
        #[arg(long, value_parser = parse_score)]
        total: f64,

        /// Category score as CATEGORY=VALUE (repeatable)
        #[arg(long = "score", value_parser = parse_category_score)]
        scores: Vec<(String, f64)>,

        #[arg(long)]
        experiment: Option<String>,

        /// Correlation id for deep links (git sha, date, run id)
        #[arg(long)]
        external_run_id: Option<String>,
    },

    /// Validate and record a JSON submission (`-` reads stdin)
    Submit { file: PathBuf },

    /// Last reported snapshot for a model
    Latest {
        model: String,
        #[command(flatten)]
        cohort: CohortArgs,
    },

    /// Snapshot history for a model, oldest first
    History {
        model: String,
        #[command(flatten)]
        cohort: CohortArgs,
        /// Keep only the most recent N entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Windowed statistics per model
    Leaderboard {
        #[command(flatten)]
        cohort: CohortArgs,
        /// Only include snapshots from the last N days
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        since_days: Option<i64>,
    },

    /// Raw snapshots across models, newest first
    List {
        #[command(flatten)]
        cohort: CohortArgs,
        /// Include every experiment cohort
        #[arg(long, conflicts_with = "experiment")]
        all_experiments: bool,
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum RunsAction {
    /// Create a pending run
    Create {
        #[arg(long)]
        model: String,
        #[arg(long)]
        formatted_name: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        /// External label such as a git sha or date
        #[arg(long)]
        run_label: Option<String>,
        /// Planned eval path as CATEGORY/NAME (repeatable)
        #[arg(long = "eval")]
        planned_evals: Vec<String>,
        #[arg(long)]
        experiment: Option<String>,
    },

    /// Mark a pending run as running
    Start { run_id: String },

    /// Mark a run as completed
    Complete {
        run_id: String,
        #[arg(long, default_value = "0")]
        duration_ms: u64,
    },

    /// Mark a run as failed
    Fail {
        run_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "0")]
        duration_ms: u64,
    },

    /// Windowed statistics per model over completed runs
    Leaderboard {
        #[command(flatten)]
        cohort: CohortArgs,
        /// Only include runs from the last N days
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        since_days: Option<i64>,
    },

    /// Derived score per completed run of a model, oldest first
    History {
        model: String,
        #[command(flatten)]
        cohort: CohortArgs,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Runs with eval counts, newest first
    List {
        #[arg(long)]
        model: Option<String>,
        #[command(flatten)]
        cohort: CohortArgs,
        #[arg(long, conflicts_with = "experiment")]
        all_experiments: bool,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// A run with its evals and derived score
    Show { run_id: String },
}

#[derive(Subcommand)]
enum EvalsAction {
    /// Create a pending eval under a run
    Create {
        run_id: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        name: String,
    },

    /// Mark a pending eval as running
    Start { eval_id: String },

    /// Mark an eval as passed
    Pass {
        eval_id: String,
        #[arg(long, default_value = "0")]
        duration_ms: u64,
    },

    /// Mark an eval as failed
    Fail {
        eval_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, default_value = "0")]
        duration_ms: u64,
    },
}

#[derive(Subcommand)]
enum MaintenanceAction {
    /// Fail runs left pending or running past the stuck threshold
    FailStuck {
        /// Override the threshold in minutes
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        threshold_minutes: Option<i64>,
    },
}

/// Score and run boards sharing one database handle.
struct Boards {
    scores: ScoreBoard<SurrealScoreStore>,
    runs: RunBoard<SurrealRunStore>,
}

impl Boards {
    fn new(handle: SurrealHandle, config: BoardConfig) -> Self {
        Self {
            scores: ScoreBoard::with_config(SurrealScoreStore::new(handle.clone()), config.clone()),
            runs: RunBoard::with_config(SurrealRunStore::new(handle), config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    evalboard_core::telemetry::init_tracing(cli.json, level);

    let config = BoardConfig::from_env().context("Invalid evalboard configuration")?;
    let handle = if cli.in_memory {
        SurrealHandle::in_memory().await
    } else {
        SurrealHandle::from_env().await
    }
    .context("Failed to connect to evalboard database")?;
    let boards = Boards::new(handle, config);

    let output = run_command(&boards, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    evalboard_core::metrics::METRICS.flush();
    Ok(())
}

async fn run_command(boards: &Boards, command: Commands) -> Result<Value> {
    match command {
        Commands::Scores { action } => match action {
            ScoresAction::Record {
                model,
                total,
                scores,
                experiment,
                external_run_id,
            } => {
                cmd_scores_record(
                    boards,
                    &model,
                    total,
                    scores,
                    experiment.as_deref(),
                    external_run_id,
                )
                .await
            }
            ScoresAction::Submit { file } => cmd_scores_submit(boards, &file).await,
            ScoresAction::Latest { model, cohort } => {
                cmd_scores_latest(boards, &model, &cohort).await
            }
            ScoresAction::History {
                model,
                cohort,
                limit,
            } => cmd_scores_history(boards, &model, &cohort, limit).await,
            ScoresAction::Leaderboard { cohort, since_days } => {
                cmd_scores_leaderboard(boards, &cohort, since_days).await
            }
            ScoresAction::List {
                cohort,
                all_experiments,
                limit,
            } => cmd_scores_list(boards, &cohort, all_experiments, limit).await,
        },
        Commands::Runs { action } => match action {
            RunsAction::Create {
                model,
                formatted_name,
                provider,
                run_label,
                planned_evals,
                experiment,
            } => {
                let run = NewRun {
                    model,
                    formatted_name,
                    provider,
                    run_label,
                    planned_evals,
                    experiment: parse_experiment(experiment.as_deref())?,
                };
                cmd_runs_create(boards, run).await
            }
            RunsAction::Start { run_id } => {
                let run_id = RunId::from(run_id.as_str());
                boards.runs.store().start_run(&run_id).await?;
                cmd_runs_show(boards, &run_id).await
            }
            RunsAction::Complete {
                run_id,
                duration_ms,
            } => {
                let run_id = RunId::from(run_id.as_str());
                boards
                    .runs
                    .store()
                    .complete_run(&run_id, duration_ms)
                    .await
                    .with_context(|| format!("Failed to complete run {}", run_id))?;
                cmd_runs_show(boards, &run_id).await
            }
            RunsAction::Fail {
                run_id,
                reason,
                duration_ms,
            } => {
                let run_id = RunId::from(run_id.as_str());
                boards
                    .runs
                    .store()
                    .fail_run(&run_id, &reason, duration_ms)
                    .await
                    .with_context(|| format!("Failed to fail run {}", run_id))?;
                cmd_runs_show(boards, &run_id).await
            }
            RunsAction::Leaderboard { cohort, since_days } => {
                cmd_runs_leaderboard(boards, &cohort, since_days).await
            }
            RunsAction::History {
                model,
                cohort,
                limit,
            } => cmd_runs_history(boards, &model, &cohort, limit).await,
            RunsAction::List {
                model,
                cohort,
                all_experiments,
                limit,
            } => cmd_runs_list(boards, model.as_deref(), &cohort, all_experiments, limit).await,
            RunsAction::Show { run_id } => {
                cmd_runs_show(boards, &RunId::from(run_id.as_str())).await
            }
        },
        Commands::Evals { action } => cmd_evals(boards, action).await,
        Commands::Maintenance { action } => match action {
            MaintenanceAction::FailStuck { threshold_minutes } => {
                cmd_fail_stuck(boards, threshold_minutes).await
            }
        },
    }
}

fn parse_category_score(raw: &str) -> std::result::Result<(String, f64), String> {
    let (category, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=VALUE, got {:?}", raw))?;
    if category.is_empty() {
        return Err(format!("missing category in {:?}", raw));
    }
    let value = parse_score(value).map_err(|e| format!("score for {:?}: {}", category, e))?;
    Ok((category.to_string(), value))
}

fn parse_score(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("{:?} is not a number", raw))?;
    if !value.is_finite() {
        return Err(format!("{:?} is not a finite number", raw));
    }
    Ok(value)
}

fn read_scope(cohort: &CohortArgs, include_all: bool, since_days: Option<i64>) -> Result<ReadScope> {
    let experiment = experiment_filter(cohort.experiment.as_deref(), include_all)?;
    let mut scope = ReadScope::new(experiment);
    if let Some(days) = since_days {
        let max_age = Duration::try_days(days)
            .with_context(|| format!("--since-days {} is out of range", days))?;
        scope = scope.with_range(TimeRange::since(max_age, Utc::now()));
    }
    Ok(scope)
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize output")
}

// ========== Score Commands ==========

async fn cmd_scores_record(
    boards: &Boards,
    model: &str,
    total: f64,
    scores: Vec<(String, f64)>,
    experiment: Option<&str>,
    external_run_id: Option<String>,
) -> Result<Value> {
    let mut snapshot =
        NewScoreSnapshot::new(model, total).with_experiment(parse_experiment(experiment)?);
    snapshot.scores.extend(scores);
    snapshot.external_run_id = external_run_id;

    let stored = boards.scores.record(snapshot).await?;
    info!("Recorded snapshot {} for {}", stored.id, stored.model);
    to_json(&stored)
}

async fn cmd_scores_submit(boards: &Boards, file: &Path) -> Result<Value> {
    let raw = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read submission from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };
    let body: Value = serde_json::from_str(&raw).context("Submission is not valid JSON")?;

    let stored = boards.scores.submit(&body).await?;
    to_json(&stored)
}

async fn cmd_scores_latest(boards: &Boards, model: &str, cohort: &CohortArgs) -> Result<Value> {
    let filter = experiment_filter(cohort.experiment.as_deref(), false)?;
    let latest = boards.scores.latest(model, &filter).await?;
    to_json(&latest)
}

async fn cmd_scores_history(
    boards: &Boards,
    model: &str,
    cohort: &CohortArgs,
    limit: Option<usize>,
) -> Result<Value> {
    let scope = read_scope(cohort, false, None)?;
    let history = boards.scores.history(model, &scope, limit).await?;
    to_json(&history)
}

async fn cmd_scores_leaderboard(
    boards: &Boards,
    cohort: &CohortArgs,
    since_days: Option<i64>,
) -> Result<Value> {
    let scope = read_scope(cohort, false, since_days)?;
    let rows = boards.scores.list_all_scores(&scope).await?;
    to_json(&rows)
}

async fn cmd_scores_list(
    boards: &Boards,
    cohort: &CohortArgs,
    all_experiments: bool,
    limit: Option<usize>,
) -> Result<Value> {
    let scope = read_scope(cohort, all_experiments, None)?;
    let snapshots = boards.scores.list_all_snapshots(&scope, limit).await?;
    to_json(&snapshots)
}

// ========== Run Commands ==========

async fn cmd_runs_create(boards: &Boards, run: NewRun) -> Result<Value> {
    let run = boards
        .runs
        .store()
        .create_run(run)
        .await
        .context("Failed to create run")?;
    info!("Created run {} for {}", run.id, run.model);
    to_json(&run)
}

async fn cmd_runs_leaderboard(
    boards: &Boards,
    cohort: &CohortArgs,
    since_days: Option<i64>,
) -> Result<Value> {
    let scope = read_scope(cohort, false, since_days)?;
    let rows = boards.runs.leaderboard_scores(&scope).await?;
    to_json(&rows)
}

async fn cmd_runs_history(
    boards: &Boards,
    model: &str,
    cohort: &CohortArgs,
    limit: Option<usize>,
) -> Result<Value> {
    let scope = read_scope(cohort, false, None)?;
    let history = boards.runs.model_history(model, &scope, limit).await?;
    to_json(&history)
}

async fn cmd_runs_list(
    boards: &Boards,
    model: Option<&str>,
    cohort: &CohortArgs,
    all_experiments: bool,
    limit: Option<usize>,
) -> Result<Value> {
    let scope = read_scope(cohort, all_experiments, None)?;
    let runs = boards.runs.list_runs(model, &scope, limit).await?;
    to_json(&runs)
}

async fn cmd_runs_show(boards: &Boards, run_id: &RunId) -> Result<Value> {
    let details = boards
        .runs
        .run_details(run_id)
        .await?
        .with_context(|| format!("Run not found: {}", run_id))?;
    to_json(&details)
}

// ========== Eval Commands ==========

async fn cmd_evals(boards: &Boards, action: EvalsAction) -> Result<Value> {
    let store = boards.runs.store();
    match action {
        EvalsAction::Create {
            run_id,
            category,
            name,
        } => {
            let eval = store
                .create_eval(NewEval::new(RunId::from(run_id.as_str()), category, name))
                .await
                .context("Failed to create eval")?;
            to_json(&eval)
        }
        EvalsAction::Start { eval_id } => {
            let eval_id = EvalId::from(eval_id.as_str());
            store.start_eval(&eval_id).await?;
            Ok(serde_json::json!({ "eval_id": eval_id, "status": "running" }))
        }
        EvalsAction::Pass {
            eval_id,
            duration_ms,
        } => {
            let eval_id = EvalId::from(eval_id.as_str());
            store.pass_eval(&eval_id, duration_ms).await?;
            Ok(serde_json::json!({ "eval_id": eval_id, "status": "passed" }))
        }
        EvalsAction::Fail {
            eval_id,
            reason,
            duration_ms,
        } => {
            let eval_id = EvalId::from(eval_id.as_str());
            store.fail_eval(&eval_id, &reason, duration_ms).await?;
            Ok(serde_json::json!({ "eval_id": eval_id, "status": "failed" }))
        }
    }
}

// ========== Maintenance Commands ==========

async fn cmd_fail_stuck(boards: &Boards, threshold_minutes: Option<i64>) -> Result<Value> {
    let now = Utc::now();
    let failed = match threshold_minutes {
        Some(minutes) => {
            let threshold = Duration::try_minutes(minutes)
                .with_context(|| format!("--threshold-minutes {} is out of range", minutes))?;
            evalboard_core::fail_stuck_runs(boards.runs.store(), now, threshold).await?
        }
        None => boards.runs.fail_stuck_runs(now).await?,
    };
    Ok(serde_json::json!({ "failed_runs": failed }))
}
