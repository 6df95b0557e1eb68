//! SurrealDB-backed RunStore implementation
//!
//! Uses `schema::RunRow` and `schema::EvalRow` for persistence, converting
//! to/from `storage_traits` types at the boundary.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::MonotonicClock;
use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::{eval_status_columns, run_status_columns, EvalRow, RunRow};
use crate::storage_traits::{
    ensure_eval_open, ensure_eval_pending, ensure_run_open, ensure_run_pending, EvalId,
    EvalRecord, EvalStatus, NewEval, NewRun, RunId, RunQuery, RunRecord, RunStatus, RunStore,
    StorageResult,
};

/// SurrealDB-backed implementation of [`RunStore`].
pub struct SurrealRunStore {
    handle: SurrealHandle,
    clock: MonotonicClock,
    /// Serializes status changes issued through this store.
    transitions: Mutex<()>,
}

impl SurrealRunStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self {
            handle,
            clock: MonotonicClock::new(),
            transitions: Mutex::new(()),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(SurrealHandle::in_memory().await?))
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM runs WHERE run_id = $rid")
            .bind(("rid", run_id.0.clone()))
            .await?;
        let rows: Vec<RunRow> = res.take(0)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?
            .into_record()
    }

    async fn fetch_eval(&self, eval_id: &EvalId) -> StorageResult<EvalRecord> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM evals WHERE eval_id = $eid")
            .bind(("eid", eval_id.0.clone()))
            .await?;
        let rows: Vec<EvalRow> = res.take(0)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::EvalNotFound {
                eval_id: eval_id.0.clone(),
            })?
            .into_record()
    }

    /// Apply a status change with one conditional `UPDATE`. The row is only
    /// written while its status is still in `from`, so concurrent terminal
    /// transitions cannot both succeed.
    async fn transition_run(&self, run_id: &RunId, status: RunStatus) -> StorageResult<()> {
        let from: &[&str] = match status {
            RunStatus::Running => &["pending"],
            _ => &["pending", "running"],
        };
        let (status_col, reason, duration) = run_status_columns(&status);
        debug!(run_id = %run_id, status = %status.kind(), "run transition");
        let _guard = self.transitions.lock().await;

        let sql = "UPDATE runs SET status = $status, failure_reason = $reason, \
                   duration_ms = $duration WHERE run_id = $rid AND status IN $from RETURN AFTER";
        let updated: Vec<RunRow> = self
            .conditional_update(sql, run_id.as_str(), status_col, reason, duration, from)
            .await?;
        if !updated.is_empty() {
            return Ok(());
        }

        // Nothing matched: either the run is missing or it left `from` first.
        let current = self.fetch_run(run_id).await?;
        match status {
            RunStatus::Running => ensure_run_pending(run_id, &current.status)?,
            _ => ensure_run_open(run_id, &current.status)?,
        }
        Err(StorageError::InvalidRunState {
            run_id: run_id.0.clone(),
            status: current.status.kind().to_string(),
            expected: from.join(" or "),
        })
    }

    async fn transition_eval(&self, eval_id: &EvalId, status: EvalStatus) -> StorageResult<()> {
        let from: &[&str] = match status {
            EvalStatus::Running => &["pending"],
            _ => &["pending", "running"],
        };
        let (status_col, reason, duration) = eval_status_columns(&status);
        debug!(eval_id = %eval_id, status = status.as_str(), "eval transition");
        let _guard = self.transitions.lock().await;

        let sql = "UPDATE evals SET status = $status, failure_reason = $reason, \
                   duration_ms = $duration WHERE eval_id = $rid AND status IN $from RETURN AFTER";
        let updated: Vec<EvalRow> = self
            .conditional_update(sql, eval_id.as_str(), status_col, reason, duration, from)
            .await?;
        if !updated.is_empty() {
            return Ok(());
        }

        let current = self.fetch_eval(eval_id).await?;
        match status {
            EvalStatus::Running => ensure_eval_pending(eval_id, &current.status)?,
            _ => ensure_eval_open(eval_id, &current.status)?,
        }
        Err(StorageError::InvalidEvalState {
            eval_id: eval_id.0.clone(),
            status: current.status.as_str().to_string(),
            expected: from.join(" or "),
        })
    }

    /// Run a status `UPDATE`, retrying when the engine reports a retryable
    /// transaction conflict. A retried statement re-evaluates its `WHERE`
    /// clause, so the loser of a race sees no matching row.
    async fn conditional_update<T>(
        &self,
        sql: &str,
        id: &str,
        status: String,
        reason: Option<String>,
        duration: Option<u64>,
        from: &[&str],
    ) -> StorageResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();
        let mut attempt = 1;
        loop {
            let result = self
                .handle
                .db()
                .query(sql)
                .bind(("status", status.clone()))
                .bind(("reason", reason.clone()))
                .bind(("duration", duration))
                .bind(("rid", id.to_string()))
                .bind(("from", from.clone()))
                .await
                .map_err(StorageError::from)
                .and_then(|mut res| res.take::<Vec<T>>(0).map_err(StorageError::from));

            match result {
                Err(err) if attempt < TRANSITION_ATTEMPTS && is_retryable(&err) => {
                    debug!(attempt, error = %err, "retrying conflicted status update");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

const TRANSITION_ATTEMPTS: usize = 5;

fn is_retryable(err: &StorageError) -> bool {
    matches!(err, StorageError::Backend(msg) if msg.contains("can be retried"))
}

#[async_trait]
impl RunStore for SurrealRunStore {
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord> {
        let record = run.into_record(RunId::new(), self.clock.now());
        debug!(run_id = %record.id, model = %record.model, "creating run");

        let _created: Option<RunRow> = self
            .handle
            .db()
            .create("runs")
            .content(RunRow::from(&record))
            .await?;

        Ok(record)
    }

    async fn start_run(&self, run_id: &RunId) -> StorageResult<()> {
        self.transition_run(run_id, RunStatus::Running).await
    }

    async fn complete_run(&self, run_id: &RunId, duration_ms: u64) -> StorageResult<()> {
        self.transition_run(run_id, RunStatus::Completed { duration_ms })
            .await
    }

    async fn fail_run(
        &self,
        run_id: &RunId,
        failure_reason: &str,
        duration_ms: u64,
    ) -> StorageResult<()> {
        let status = RunStatus::Failed {
            failure_reason: failure_reason.to_string(),
            duration_ms,
        };
        self.transition_run(run_id, status).await
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<Option<RunRecord>> {
        match self.fetch_run(run_id).await {
            Ok(run) => Ok(Some(run)),
            Err(StorageError::RunNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_runs(&self, query: &RunQuery) -> StorageResult<Vec<RunRecord>> {
        let mut res = match &query.model {
            Some(model) => {
                self.handle
                    .db()
                    .query("SELECT * FROM runs WHERE model = $model ORDER BY created_at ASC")
                    .bind(("model", model.clone()))
                    .await?
            }
            None => {
                self.handle
                    .db()
                    .query("SELECT * FROM runs ORDER BY created_at ASC")
                    .await?
            }
        };
        let rows: Vec<RunRow> = res.take(0)?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let run = row.into_record()?;
            if query.matches(&run) {
                runs.push(run);
            }
        }
        Ok(runs)
    }

    async fn create_eval(&self, eval: NewEval) -> StorageResult<EvalRecord> {
        // Referential check: evals only attach to known runs.
        self.fetch_run(&eval.run_id).await?;

        let record = eval.into_record(EvalId::new(), self.clock.now());
        debug!(eval_id = %record.id, run_id = %record.run_id, path = %record.eval_path, "creating eval");

        let _created: Option<EvalRow> = self
            .handle
            .db()
            .create("evals")
            .content(EvalRow::from(&record))
            .await?;

        Ok(record)
    }

    async fn start_eval(&self, eval_id: &EvalId) -> StorageResult<()> {
        self.transition_eval(eval_id, EvalStatus::Running).await
    }

    async fn pass_eval(&self, eval_id: &EvalId, duration_ms: u64) -> StorageResult<()> {
        self.transition_eval(eval_id, EvalStatus::Passed { duration_ms })
            .await
    }

    async fn fail_eval(
        &self,
        eval_id: &EvalId,
        failure_reason: &str,
        duration_ms: u64,
    ) -> StorageResult<()> {
        let status = EvalStatus::Failed {
            failure_reason: failure_reason.to_string(),
            duration_ms,
        };
        self.transition_eval(eval_id, status).await
    }

    async fn list_evals(&self, run_id: &RunId) -> StorageResult<Vec<EvalRecord>> {
        self.fetch_run(run_id).await?;

        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM evals WHERE run_id = $rid ORDER BY created_at ASC")
            .bind(("rid", run_id.0.clone()))
            .await?;
        let rows: Vec<EvalRow> = res.take(0)?;

        rows.into_iter().map(EvalRow::into_record).collect()
    }
}
