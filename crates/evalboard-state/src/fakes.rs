//! In-memory fakes for storage traits (testing and `--in-memory` runs)
//!
//! Provides `MemoryScoreStore` and `MemoryRunStore` that satisfy the trait
//! contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::clock::MonotonicClock;
use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| StorageError::Backend(format!("in-memory store poisoned: {e}")))
}

// ---------------------------------------------------------------------------
// MemoryScoreStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store backed by an append-only `Vec`.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    snapshots: Mutex<Vec<ScoreSnapshot>>,
    clock: MonotonicClock,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn append(&self, snapshot: NewScoreSnapshot) -> StorageResult<ScoreSnapshot> {
        let mut snapshots = lock(&self.snapshots)?;
        let stored = snapshot.into_snapshot(SnapshotId::new(), self.clock.now());
        snapshots.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &SnapshotId) -> StorageResult<ScoreSnapshot> {
        let snapshots = lock(&self.snapshots)?;
        snapshots
            .iter()
            .find(|s| s.id == *id)
            .cloned()
            .ok_or_else(|| StorageError::SnapshotNotFound {
                snapshot_id: id.0.clone(),
            })
    }

    async fn latest(
        &self,
        model: &str,
        experiment: &ExperimentFilter,
    ) -> StorageResult<Option<ScoreSnapshot>> {
        let snapshots = lock(&self.snapshots)?;
        Ok(snapshots
            .iter()
            .filter(|s| s.model == model && experiment.matches(s.experiment.as_ref()))
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn list(&self, query: &SnapshotQuery) -> StorageResult<Vec<ScoreSnapshot>> {
        let snapshots = lock(&self.snapshots)?;
        let mut matching: Vec<ScoreSnapshot> = snapshots
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.created_at);
        Ok(matching)
    }
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

/// In-memory run store backed by `HashMap`s keyed by id.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, RunRecord>>,
    evals: Mutex<HashMap<String, EvalRecord>>,
    clock: MonotonicClock,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_run(
        &self,
        run_id: &RunId,
        apply: impl FnOnce(&mut RunRecord) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut runs = lock(&self.runs)?;
        let run = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        apply(run)
    }

    fn update_eval(
        &self,
        eval_id: &EvalId,
        apply: impl FnOnce(&mut EvalRecord) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut evals = lock(&self.evals)?;
        let eval = evals
            .get_mut(&eval_id.0)
            .ok_or_else(|| StorageError::EvalNotFound {
                eval_id: eval_id.0.clone(),
            })?;
        apply(eval)
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, run: NewRun) -> StorageResult<RunRecord> {
        let record = run.into_record(RunId::new(), self.clock.now());
        let mut runs = lock(&self.runs)?;
        runs.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    async fn start_run(&self, run_id: &RunId) -> StorageResult<()> {
        self.update_run(run_id, |run| {
            ensure_run_pending(run_id, &run.status)?;
            run.status = RunStatus::Running;
            Ok(())
        })
    }

    async fn complete_run(&self, run_id: &RunId, duration_ms: u64) -> StorageResult<()> {
        self.update_run(run_id, |run| {
            ensure_run_open(run_id, &run.status)?;
            run.status = RunStatus::Completed { duration_ms };
            Ok(())
        })
    }

    async fn fail_run(
        &self,
        run_id: &RunId,
        failure_reason: &str,
        duration_ms: u64,
    ) -> StorageResult<()> {
        self.update_run(run_id, |run| {
            ensure_run_open(run_id, &run.status)?;
            run.status = RunStatus::Failed {
                failure_reason: failure_reason.to_string(),
                duration_ms,
            };
            Ok(())
        })
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<Option<RunRecord>> {
        let runs = lock(&self.runs)?;
        Ok(runs.get(&run_id.0).cloned())
    }

    async fn list_runs(&self, query: &RunQuery) -> StorageResult<Vec<RunRecord>> {
        let runs = lock(&self.runs)?;
        let mut matching: Vec<RunRecord> =
            runs.values().filter(|r| query.matches(r)).cloned().collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }

    async fn create_eval(&self, eval: NewEval) -> StorageResult<EvalRecord> {
        // Hold the runs lock so the run cannot vanish between check and insert.
        let runs = lock(&self.runs)?;
        if !runs.contains_key(&eval.run_id.0) {
            return Err(StorageError::RunNotFound {
                run_id: eval.run_id.0.clone(),
            });
        }
        let record = eval.into_record(EvalId::new(), self.clock.now());
        let mut evals = lock(&self.evals)?;
        evals.insert(record.id.0.clone(), record.clone());
        drop(runs);
        Ok(record)
    }

    async fn start_eval(&self, eval_id: &EvalId) -> StorageResult<()> {
        self.update_eval(eval_id, |eval| {
            ensure_eval_pending(eval_id, &eval.status)?;
            eval.status = EvalStatus::Running;
            Ok(())
        })
    }

    async fn pass_eval(&self, eval_id: &EvalId, duration_ms: u64) -> StorageResult<()> {
        self.update_eval(eval_id, |eval| {
            ensure_eval_open(eval_id, &eval.status)?;
            eval.status = EvalStatus::Passed { duration_ms };
            Ok(())
        })
    }

    async fn fail_eval(
        &self,
        eval_id: &EvalId,
        failure_reason: &str,
        duration_ms: u64,
    ) -> StorageResult<()> {
        self.update_eval(eval_id, |eval| {
            ensure_eval_open(eval_id, &eval.status)?;
            eval.status = EvalStatus::Failed {
                failure_reason: failure_reason.to_string(),
                duration_ms,
            };
            Ok(())
        })
    }

    async fn list_evals(&self, run_id: &RunId) -> StorageResult<Vec<EvalRecord>> {
        if !lock(&self.runs)?.contains_key(&run_id.0) {
            return Err(StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            });
        }
        let evals = lock(&self.evals)?;
        let mut matching: Vec<EvalRecord> = evals
            .values()
            .filter(|e| e.run_id == *run_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.created_at);
        Ok(matching)
    }
}
