//! Evalboard Core Library
//!
//! Rolling leaderboard statistics for evaluated models. Two producers feed
//! one windowed aggregator:
//!
//! - `ScoreBoard`: externally reported score snapshots
//! - `RunBoard`: scores derived from completed runs and their pass/fail evals
//!
//! Both adapt their records into `ScoreSample` and call `aggregate`, which
//! takes the most recent `WINDOW_SIZE` samples and reports per-category and
//! total means with population standard deviation error bars.

pub mod aggregate;
pub mod config;
pub mod derive;
pub mod domain;
pub mod maintenance;
pub mod metrics;
pub mod obs;
pub mod query;
pub mod runboard;
pub mod scoreboard;
pub mod telemetry;

pub use aggregate::{aggregate, mean_and_std_dev, ScoreSample, WindowedAggregate, WINDOW_SIZE};
pub use config::{BoardConfig, ConfigError, SUGGESTED_MAX_AGE_DAYS};
pub use derive::{derived_score, DerivedScore, EvalCounts};
pub use domain::{
    ensure_finite_scores, experiment_filter, parse_experiment, EvalboardError, Result, ScoreError,
    ScoreSubmission, ValidationError,
};
pub use maintenance::fail_stuck_runs;
pub use query::ReadScope;
pub use runboard::{ModelHistory, RunBoard, RunDetails, RunRow, RunSummary};
pub use scoreboard::{ScoreBoard, ScoreRow};

pub use evalboard_state::{
    ExperimentFilter, ExperimentTag, NewEval, NewRun, NewScoreSnapshot, RunId, ScoreSnapshot,
    SurrealHandle, TimeRange,
};
