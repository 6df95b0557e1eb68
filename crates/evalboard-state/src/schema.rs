//! Row definitions for the evalboard SurrealDB tables
//!
//! Tables:
//! - score_snapshots: externally reported score snapshots (append-only)
//! - runs: evaluation runs
//! - evals: pass/fail sub-evaluations of a run
//!
//! Rows are flat (status discriminants stored as strings) so they can be
//! filtered in SurrealQL; conversion to the `storage_traits` types happens
//! at the boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    EvalId, EvalRecord, EvalStatus, ExperimentTag, RunId, RunRecord, RunStatus, ScoreSnapshot,
    SnapshotId, StorageResult,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

fn experiment_from_row(experiment: Option<String>) -> Option<ExperimentTag> {
    experiment.and_then(ExperimentTag::new)
}

/// Flat status columns: `(status, failure_reason, duration_ms)`.
pub type StatusColumns = (String, Option<String>, Option<u64>);

pub fn run_status_columns(status: &RunStatus) -> StatusColumns {
    let kind = status.kind().as_str().to_string();
    match status {
        RunStatus::Pending | RunStatus::Running => (kind, None, None),
        RunStatus::Completed { duration_ms } => (kind, None, Some(*duration_ms)),
        RunStatus::Failed {
            failure_reason,
            duration_ms,
        } => (kind, Some(failure_reason.clone()), Some(*duration_ms)),
    }
}

pub fn eval_status_columns(status: &EvalStatus) -> StatusColumns {
    let kind = status.as_str().to_string();
    match status {
        EvalStatus::Pending | EvalStatus::Running => (kind, None, None),
        EvalStatus::Passed { duration_ms } => (kind, None, Some(*duration_ms)),
        EvalStatus::Failed {
            failure_reason,
            duration_ms,
        } => (kind, Some(failure_reason.clone()), Some(*duration_ms)),
    }
}

// ---------------------------------------------------------------------------
// score_snapshots
// ---------------------------------------------------------------------------

/// Score snapshot row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSnapshotRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub snapshot_id: String,
    pub model: String,
    #[serde(default)]
    pub experiment: Option<String>,
    pub total_score: f64,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub external_run_id: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&ScoreSnapshot> for ScoreSnapshotRow {
    fn from(s: &ScoreSnapshot) -> Self {
        ScoreSnapshotRow {
            id: None,
            snapshot_id: s.id.0.clone(),
            model: s.model.clone(),
            experiment: s.experiment.as_ref().map(|e| e.as_str().to_string()),
            total_score: s.total_score,
            scores: s.scores.clone(),
            external_run_id: s.external_run_id.clone(),
            created_at: s.created_at,
        }
    }
}

impl From<ScoreSnapshotRow> for ScoreSnapshot {
    fn from(row: ScoreSnapshotRow) -> Self {
        ScoreSnapshot {
            id: SnapshotId(row.snapshot_id),
            model: row.model,
            experiment: experiment_from_row(row.experiment),
            total_score: row.total_score,
            scores: row.scores,
            external_run_id: row.external_run_id,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// Run row. `status` is one of "pending" | "running" | "completed" | "failed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub model: String,
    #[serde(default)]
    pub formatted_name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub run_label: Option<String>,
    #[serde(default)]
    pub planned_evals: Vec<String>,
    #[serde(default)]
    pub experiment: Option<String>,
    pub status: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl RunRow {
    /// Overwrite the status columns from a domain status.
    pub fn with_status(mut self, status: &RunStatus) -> Self {
        (self.status, self.failure_reason, self.duration_ms) = run_status_columns(status);
        self
    }

    pub fn status(&self) -> StorageResult<RunStatus> {
        let duration_ms = self.duration_ms.unwrap_or(0);
        match self.status.as_str() {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed { duration_ms }),
            "failed" => Ok(RunStatus::Failed {
                failure_reason: self.failure_reason.clone().unwrap_or_default(),
                duration_ms,
            }),
            other => Err(StorageError::Serialization(format!(
                "unknown run status: {other}"
            ))),
        }
    }

    pub fn into_record(self) -> StorageResult<RunRecord> {
        let status = self.status()?;
        Ok(RunRecord {
            id: RunId(self.run_id),
            model: self.model,
            formatted_name: self.formatted_name,
            provider: self.provider,
            run_label: self.run_label,
            planned_evals: self.planned_evals,
            experiment: experiment_from_row(self.experiment),
            status,
            created_at: self.created_at,
        })
    }
}

impl From<&RunRecord> for RunRow {
    fn from(run: &RunRecord) -> Self {
        RunRow {
            id: None,
            run_id: run.id.0.clone(),
            model: run.model.clone(),
            formatted_name: run.formatted_name.clone(),
            provider: run.provider.clone(),
            run_label: run.run_label.clone(),
            planned_evals: run.planned_evals.clone(),
            experiment: run.experiment.as_ref().map(|e| e.as_str().to_string()),
            status: String::new(),
            failure_reason: None,
            duration_ms: None,
            created_at: run.created_at,
        }
        .with_status(&run.status)
    }
}

// ---------------------------------------------------------------------------
// evals
// ---------------------------------------------------------------------------

/// Eval row. `status` is one of "pending" | "running" | "passed" | "failed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub eval_id: String,
    pub run_id: String,
    pub eval_path: String,
    pub category: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl EvalRow {
    pub fn with_status(mut self, status: &EvalStatus) -> Self {
        (self.status, self.failure_reason, self.duration_ms) = eval_status_columns(status);
        self
    }

    pub fn status(&self) -> StorageResult<EvalStatus> {
        let duration_ms = self.duration_ms.unwrap_or(0);
        match self.status.as_str() {
            "pending" => Ok(EvalStatus::Pending),
            "running" => Ok(EvalStatus::Running),
            "passed" => Ok(EvalStatus::Passed { duration_ms }),
            "failed" => Ok(EvalStatus::Failed {
                failure_reason: self.failure_reason.clone().unwrap_or_default(),
                duration_ms,
            }),
            other => Err(StorageError::Serialization(format!(
                "unknown eval status: {other}"
            ))),
        }
    }

    pub fn into_record(self) -> StorageResult<EvalRecord> {
        let status = self.status()?;
        Ok(EvalRecord {
            id: EvalId(self.eval_id),
            run_id: RunId(self.run_id),
            eval_path: self.eval_path,
            category: self.category,
            name: self.name,
            status,
            created_at: self.created_at,
        })
    }
}

impl From<&EvalRecord> for EvalRow {
    fn from(eval: &EvalRecord) -> Self {
        EvalRow {
            id: None,
            eval_id: eval.id.0.clone(),
            run_id: eval.run_id.0.clone(),
            eval_path: eval.eval_path.clone(),
            category: eval.category.clone(),
            name: eval.name.clone(),
            status: String::new(),
            failure_reason: None,
            duration_ms: None,
            created_at: eval.created_at,
        }
        .with_status(&eval.status)
    }
}
