//! Leaderboard over scores derived from completed runs and their evals.
//!
//! Only completed runs contribute. A completed run that still has no
//! computable score (no evals recorded) is skipped with a warning and does
//! not count towards `run_count`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use evalboard_state::{EvalRecord, RunId, RunQuery, RunRecord, RunStatusKind, RunStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{aggregate, ScoreSample, WindowedAggregate, WINDOW_SIZE};
use crate::config::BoardConfig;
use crate::derive::{derived_score, DerivedScore, EvalCounts};
use crate::domain::Result;
use crate::maintenance;
use crate::metrics::METRICS;
use crate::obs;
use crate::query::{keep_most_recent, newest_first, ReadScope};

/// One leaderboard row for a model's completed runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRow {
    pub model: String,
    /// Display name of the newest run, falling back to the model id.
    pub formatted_name: String,
    #[serde(flatten)]
    pub stats: WindowedAggregate,
    pub latest_run_id: RunId,
    pub latest_run_time: DateTime<Utc>,
}

/// Per-run derived scores for one model, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHistory {
    pub model: String,
    pub entries: Vec<DerivedScore>,
    /// Newest scored run in the whole filtered history, independent of any
    /// limit applied to `entries`.
    pub latest_run_id: Option<RunId>,
}

/// A run with its eval tallies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub run: RunRecord,
    pub eval_counts: EvalCounts,
}

/// A run, its evals and (once completed) its derived score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetails {
    #[serde(flatten)]
    pub run: RunRecord,
    pub evals: Vec<EvalRecord>,
    pub eval_counts: EvalCounts,
    pub score: Option<DerivedScore>,
}

struct ScoredRun {
    run: RunRecord,
    score: DerivedScore,
}

/// Thin API layer over a run store.
pub struct RunBoard<R> {
    store: R,
    config: BoardConfig,
}

impl<R> RunBoard<R>
where
    R: RunStore,
{
    pub fn new(store: R) -> Self {
        Self::with_config(store, BoardConfig::default())
    }

    pub fn with_config(store: R, config: BoardConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    /// Windowed statistics per model over completed runs, sorted by model.
    pub async fn leaderboard_scores(&self, scope: &ReadScope) -> Result<Vec<RunRow>> {
        scope.ensure_single_cohort()?;
        let scored = self.scored_runs(None, scope).await?;

        let mut by_model: BTreeMap<String, Vec<ScoredRun>> = BTreeMap::new();
        for entry in scored {
            by_model
                .entry(entry.run.model.clone())
                .or_default()
                .push(entry);
        }

        let mut rows = Vec::with_capacity(by_model.len());
        for (model, entries) in by_model {
            let Some(newest) = entries.last() else {
                continue;
            };
            let _span = obs::ModelSpan::enter(&model);

            let samples: Vec<ScoreSample<'_>> = entries.iter().map(|e| e.score.sample()).collect();
            let stats = aggregate(&samples, WINDOW_SIZE)?;
            METRICS.inc_aggregates();
            debug!(model = %model, run_count = stats.run_count, "aggregated runs");

            rows.push(RunRow {
                formatted_name: newest.run.display_name().to_string(),
                latest_run_id: newest.run.id.clone(),
                latest_run_time: newest.run.created_at,
                model,
                stats,
            });
        }

        obs::emit_leaderboard_computed("runs", rows.len());
        Ok(rows)
    }

    /// Derived score per completed run of `model`, oldest first.
    pub async fn model_history(
        &self,
        model: &str,
        scope: &ReadScope,
        limit: Option<usize>,
    ) -> Result<ModelHistory> {
        let scored = self.scored_runs(Some(model), scope).await?;
        let latest_run_id = scored.last().map(|e| e.run.id.clone());
        let entries = scored.into_iter().map(|e| e.score).collect();

        Ok(ModelHistory {
            model: model.to_string(),
            entries: keep_most_recent(entries, limit),
            latest_run_id,
        })
    }

    /// Runs of any status, newest first, with eval tallies.
    ///
    /// `limit` defaults to the configured run list limit.
    pub async fn list_runs(
        &self,
        model: Option<&str>,
        scope: &ReadScope,
        limit: Option<usize>,
    ) -> Result<Vec<RunSummary>> {
        let query = RunQuery {
            model: model.map(str::to_string),
            experiment: scope.experiment.clone(),
            status: None,
            range: scope.resolve_range(&self.config, Utc::now()),
        };
        let mut runs = self.store.list_runs(&query).await?;
        runs.sort_by_key(|r| r.created_at);
        let runs = newest_first(runs, Some(limit.unwrap_or(self.config.run_list_limit)));

        let mut summaries = Vec::with_capacity(runs.len());
        for run in runs {
            let evals = self.store.list_evals(&run.id).await?;
            summaries.push(RunSummary {
                eval_counts: EvalCounts::from_evals(&evals),
                run,
            });
        }
        Ok(summaries)
    }

    /// A single run with its evals. `None` if the run does not exist.
    pub async fn run_details(&self, run_id: &RunId) -> Result<Option<RunDetails>> {
        let Some(run) = self.store.get_run(run_id).await? else {
            return Ok(None);
        };
        let mut evals = self.store.list_evals(run_id).await?;
        evals.sort_by_key(|e| e.created_at);

        let score = derived_score(&run, &evals).ok();
        Ok(Some(RunDetails {
            eval_counts: EvalCounts::from_evals(&evals),
            score,
            evals,
            run,
        }))
    }

    /// Fail runs left pending or running past the configured threshold.
    pub async fn fail_stuck_runs(&self, now: DateTime<Utc>) -> Result<usize> {
        maintenance::fail_stuck_runs(&self.store, now, self.config.stuck_run_threshold).await
    }

    /// Completed runs in scope with their derived scores, oldest first.
    async fn scored_runs(&self, model: Option<&str>, scope: &ReadScope) -> Result<Vec<ScoredRun>> {
        let query = RunQuery {
            model: model.map(str::to_string),
            experiment: scope.experiment.clone(),
            status: Some(RunStatusKind::Completed),
            range: scope.resolve_range(&self.config, Utc::now()),
        };
        let mut runs = self.store.list_runs(&query).await?;
        runs.sort_by_key(|r| r.created_at);

        let mut scored = Vec::with_capacity(runs.len());
        for run in runs {
            let evals = self.store.list_evals(&run.id).await?;
            match derived_score(&run, &evals) {
                Ok(score) => {
                    METRICS.inc_runs_derived();
                    scored.push(ScoredRun { run, score });
                }
                Err(err) => {
                    METRICS.inc_runs_skipped();
                    obs::emit_run_skipped(run.id.as_str(), &err);
                }
            }
        }
        Ok(scored)
    }
}
