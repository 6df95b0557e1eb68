//! Storage trait definitions for evalboard
//!
//! These traits define the record store the leaderboard reads from:
//! - `ScoreStore`: append-only externally reported score snapshots
//! - `RunStore`: evaluation runs and their pass/fail evals
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module; SurrealDB implementations live in
//! `surreal_scores` and `surreal_runs`.
//!
//! Every listing returns records in ascending `created_at` order.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identity of a recorded score snapshot
    SnapshotId
);
string_id!(
    /// Identity of an evaluation run
    RunId
);
string_id!(
    /// Identity of a single eval inside a run
    EvalId
);

// ---------------------------------------------------------------------------
// Experiment cohorts
// ---------------------------------------------------------------------------

/// Label partitioning records into independent comparison cohorts.
///
/// Records without a tag belong to the default cohort. The inner string is
/// never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentTag(String);

impl ExperimentTag {
    /// Build a tag, returning `None` for an empty or whitespace-only label.
    pub fn new(label: impl Into<String>) -> Option<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            None
        } else {
            Some(ExperimentTag(label))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which experiment cohort a read is scoped to.
///
/// `Default` is a real cohort (records with no tag), not "everything";
/// only `All` skips the tag check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", content = "value")]
pub enum ExperimentFilter {
    /// Only records without an experiment tag.
    #[default]
    Default,

    /// Only records carrying exactly this tag.
    Tag(ExperimentTag),

    /// No tag filtering at all.
    All,
}

impl ExperimentFilter {
    /// Resolve the `(experiment, include_all_experiments)` argument pair.
    pub fn from_args(experiment: Option<ExperimentTag>, include_all: bool) -> Self {
        if include_all {
            return ExperimentFilter::All;
        }
        match experiment {
            Some(tag) => ExperimentFilter::Tag(tag),
            None => ExperimentFilter::Default,
        }
    }

    pub fn matches(&self, experiment: Option<&ExperimentTag>) -> bool {
        match self {
            ExperimentFilter::Default => experiment.is_none(),
            ExperimentFilter::Tag(tag) => experiment == Some(tag),
            ExperimentFilter::All => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Time ranges
// ---------------------------------------------------------------------------

/// Inclusive creation-time window. Unbounded ends match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Everything created within `max_age` of `now`.
    ///
    /// A negative age is treated as zero. An age reaching past the earliest
    /// representable time leaves the start unbounded.
    pub fn since(max_age: Duration, now: DateTime<Utc>) -> Self {
        TimeRange {
            start: now.checked_sub_signed(max_age.max(Duration::zero())),
            end: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at <= e)
    }
}

// ---------------------------------------------------------------------------
// ScoreStore: externally reported score snapshots
// ---------------------------------------------------------------------------

/// One immutable observation of a model's scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub id: SnapshotId,
    pub model: String,
    pub experiment: Option<ExperimentTag>,
    pub total_score: f64,
    /// Per-category scores; the key set may differ between snapshots.
    pub scores: BTreeMap<String, f64>,
    /// Correlation id for deep links (git sha, date string, run id).
    pub external_run_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for appending a snapshot. Identity and `created_at` are assigned
/// by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScoreSnapshot {
    pub model: String,
    pub experiment: Option<ExperimentTag>,
    pub total_score: f64,
    pub scores: BTreeMap<String, f64>,
    pub external_run_id: Option<String>,
}

impl NewScoreSnapshot {
    pub fn new(model: impl Into<String>, total_score: f64) -> Self {
        Self {
            model: model.into(),
            experiment: None,
            total_score,
            scores: BTreeMap::new(),
            external_run_id: None,
        }
    }

    pub fn with_score(mut self, category: impl Into<String>, score: f64) -> Self {
        self.scores.insert(category.into(), score);
        self
    }

    pub fn with_experiment(mut self, experiment: Option<ExperimentTag>) -> Self {
        self.experiment = experiment;
        self
    }

    pub fn with_external_run_id(mut self, external_run_id: impl Into<String>) -> Self {
        self.external_run_id = Some(external_run_id.into());
        self
    }

    /// Materialize into a stored snapshot.
    pub fn into_snapshot(self, id: SnapshotId, created_at: DateTime<Utc>) -> ScoreSnapshot {
        ScoreSnapshot {
            id,
            model: self.model,
            experiment: self.experiment,
            total_score: self.total_score,
            scores: self.scores,
            external_run_id: self.external_run_id,
            created_at,
        }
    }
}

/// Selection of snapshots for a range scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotQuery {
    /// `None` scans every model.
    pub model: Option<String>,
    pub experiment: ExperimentFilter,
    pub range: TimeRange,
}

impl SnapshotQuery {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn all_models() -> Self {
        Self::default()
    }

    pub fn with_experiment(mut self, experiment: ExperimentFilter) -> Self {
        self.experiment = experiment;
        self
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn matches(&self, snapshot: &ScoreSnapshot) -> bool {
        self.model.as_deref().map_or(true, |m| snapshot.model == m)
            && self.experiment.matches(snapshot.experiment.as_ref())
            && self.range.contains(snapshot.created_at)
    }
}

/// Append-only score snapshot store.
///
/// Guarantees:
/// - `append` never rejects a duplicate model; every call is a new point.
/// - `created_at` values handed out by one store are strictly increasing.
/// - Snapshots are never modified or deleted.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Append a snapshot, returning the stored record.
    async fn append(&self, snapshot: NewScoreSnapshot) -> StorageResult<ScoreSnapshot>;

    /// Point lookup. Returns `StorageError::SnapshotNotFound` if absent.
    async fn get(&self, id: &SnapshotId) -> StorageResult<ScoreSnapshot>;

    /// Most recently created snapshot for `model` within the cohort.
    async fn latest(
        &self,
        model: &str,
        experiment: &ExperimentFilter,
    ) -> StorageResult<Option<ScoreSnapshot>>;

    /// Matching snapshots, oldest first.
    async fn list(&self, query: &SnapshotQuery) -> StorageResult<Vec<ScoreSnapshot>>;
}

// ---------------------------------------------------------------------------
// RunStore: evaluation runs and evals
// ---------------------------------------------------------------------------

/// Lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed {
        duration_ms: u64,
    },
    Failed {
        failure_reason: String,
        duration_ms: u64,
    },
}

/// Discriminant of [`RunStatus`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatusKind {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn kind(&self) -> RunStatusKind {
        match self {
            RunStatus::Pending => RunStatusKind::Pending,
            RunStatus::Running => RunStatusKind::Running,
            RunStatus::Completed { .. } => RunStatusKind::Completed,
            RunStatus::Failed { .. } => RunStatusKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed { .. } | RunStatus::Failed { .. })
    }
}

impl RunStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatusKind::Pending => "pending",
            RunStatusKind::Running => "running",
            RunStatusKind::Completed => "completed",
            RunStatusKind::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluation execution for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub model: String,
    /// Human-readable model name for display; see [`RunRecord::display_name`].
    pub formatted_name: Option<String>,
    pub provider: Option<String>,
    /// Caller-supplied label such as a git sha or date string.
    pub run_label: Option<String>,
    /// Expected `category/name` eval paths.
    pub planned_evals: Vec<String>,
    pub experiment: Option<ExperimentTag>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    /// Formatted name, falling back to the model identifier.
    pub fn display_name(&self) -> &str {
        self.formatted_name.as_deref().unwrap_or(&self.model)
    }
}

/// Payload for creating a run. Runs always start `Pending`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub model: String,
    pub formatted_name: Option<String>,
    pub provider: Option<String>,
    pub run_label: Option<String>,
    pub planned_evals: Vec<String>,
    pub experiment: Option<ExperimentTag>,
}

impl NewRun {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_formatted_name(mut self, name: impl Into<String>) -> Self {
        self.formatted_name = Some(name.into());
        self
    }

    pub fn with_experiment(mut self, experiment: Option<ExperimentTag>) -> Self {
        self.experiment = experiment;
        self
    }

    pub fn with_planned_evals(mut self, planned: Vec<String>) -> Self {
        self.planned_evals = planned;
        self
    }

    pub fn into_record(self, id: RunId, created_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            id,
            model: self.model,
            formatted_name: self.formatted_name,
            provider: self.provider,
            run_label: self.run_label,
            planned_evals: self.planned_evals,
            experiment: self.experiment,
            status: RunStatus::Pending,
            created_at,
        }
    }
}

/// Lifecycle state of a single eval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvalStatus {
    Pending,
    Running,
    Passed {
        duration_ms: u64,
    },
    Failed {
        failure_reason: String,
        duration_ms: u64,
    },
}

impl EvalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalStatus::Pending => "pending",
            EvalStatus::Running => "running",
            EvalStatus::Passed { .. } => "passed",
            EvalStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, EvalStatus::Passed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EvalStatus::Failed { .. })
    }

    pub fn is_terminal(&self) -> bool {
        self.is_passed() || self.is_failed()
    }
}

/// One sub-evaluation (category/name pair) belonging to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub id: EvalId,
    pub run_id: RunId,
    pub eval_path: String,
    pub category: String,
    pub name: String,
    pub status: EvalStatus,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating an eval. Evals always start `Pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEval {
    pub run_id: RunId,
    pub eval_path: String,
    pub category: String,
    pub name: String,
}

impl NewEval {
    /// Eval with the conventional `category/name` path.
    pub fn new(run_id: RunId, category: impl Into<String>, name: impl Into<String>) -> Self {
        let category = category.into();
        let name = name.into();
        Self {
            run_id,
            eval_path: format!("{category}/{name}"),
            category,
            name,
        }
    }

    pub fn into_record(self, id: EvalId, created_at: DateTime<Utc>) -> EvalRecord {
        EvalRecord {
            id,
            run_id: self.run_id,
            eval_path: self.eval_path,
            category: self.category,
            name: self.name,
            status: EvalStatus::Pending,
            created_at,
        }
    }
}

/// Selection of runs for a range scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunQuery {
    pub model: Option<String>,
    pub experiment: ExperimentFilter,
    pub status: Option<RunStatusKind>,
    pub range: TimeRange,
}

impl RunQuery {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn all_models() -> Self {
        Self::default()
    }

    pub fn with_experiment(mut self, experiment: ExperimentFilter) -> Self {
        self.experiment = experiment;
        self
    }

    pub fn with_status(mut self, status: RunStatusKind) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn matches(&self, run: &RunRecord) -> bool {
        self.model.as_deref().map_or(true, |m| run.model == m)
            && self.experiment.matches(run.experiment.as_ref())
            && self.status.map_or(true, |s| run.status.kind() == s)
            && self.range.contains(run.created_at)
    }
}

/// Run and eval persistence.
///
/// Guarantees:
/// - Runs transition `Pending → Running → Completed | Failed`; the terminal
///   transition happens exactly once (`Running` may be skipped).
/// - Evals transition `Pending → Running → Passed | Failed` the same way.
/// - Evals can only be created for an existing run.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a pending run.
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord>;

    /// `Pending → Running`.
    async fn start_run(&self, run_id: &RunId) -> StorageResult<()>;

    /// Mark a non-terminal run as completed.
    async fn complete_run(&self, run_id: &RunId, duration_ms: u64) -> StorageResult<()>;

    /// Mark a non-terminal run as failed.
    async fn fail_run(
        &self,
        run_id: &RunId,
        failure_reason: &str,
        duration_ms: u64,
    ) -> StorageResult<()>;

    /// Point lookup.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<Option<RunRecord>>;

    /// Matching runs, oldest first.
    async fn list_runs(&self, query: &RunQuery) -> StorageResult<Vec<RunRecord>>;

    /// Create a pending eval under an existing run.
    async fn create_eval(&self, eval: NewEval) -> StorageResult<EvalRecord>;

    /// `Pending → Running`.
    async fn start_eval(&self, eval_id: &EvalId) -> StorageResult<()>;

    /// Mark a non-terminal eval as passed.
    async fn pass_eval(&self, eval_id: &EvalId, duration_ms: u64) -> StorageResult<()>;

    /// Mark a non-terminal eval as failed.
    async fn fail_eval(
        &self,
        eval_id: &EvalId,
        failure_reason: &str,
        duration_ms: u64,
    ) -> StorageResult<()>;

    /// All evals of a run, oldest first. `RunNotFound` if the run is unknown.
    async fn list_evals(&self, run_id: &RunId) -> StorageResult<Vec<EvalRecord>>;
}

// ---------------------------------------------------------------------------
// Transition checks shared by every backend
// ---------------------------------------------------------------------------

pub(crate) fn ensure_run_pending(run_id: &RunId, status: &RunStatus) -> StorageResult<()> {
    if *status != RunStatus::Pending {
        return Err(StorageError::InvalidRunState {
            run_id: run_id.0.clone(),
            status: status.kind().to_string(),
            expected: "pending".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_run_open(run_id: &RunId, status: &RunStatus) -> StorageResult<()> {
    if status.is_terminal() {
        return Err(StorageError::InvalidRunState {
            run_id: run_id.0.clone(),
            status: status.kind().to_string(),
            expected: "pending or running".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_eval_pending(eval_id: &EvalId, status: &EvalStatus) -> StorageResult<()> {
    if *status != EvalStatus::Pending {
        return Err(StorageError::InvalidEvalState {
            eval_id: eval_id.0.clone(),
            status: status.as_str().to_string(),
            expected: "pending".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_eval_open(eval_id: &EvalId, status: &EvalStatus) -> StorageResult<()> {
    if status.is_terminal() {
        return Err(StorageError::InvalidEvalState {
            eval_id: eval_id.0.clone(),
            status: status.as_str().to_string(),
            expected: "pending or running".to_string(),
        });
    }
    Ok(())
}
