//! Leaderboard over externally reported score snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use evalboard_state::{
    ExperimentFilter, NewScoreSnapshot, ScoreSnapshot, ScoreStore, SnapshotId, SnapshotQuery,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{aggregate, ScoreSample, WindowedAggregate, WINDOW_SIZE};
use crate::config::BoardConfig;
use crate::domain::{ensure_finite_scores, Result, ScoreSubmission};
use crate::metrics::METRICS;
use crate::obs;
use crate::query::{keep_most_recent, newest_first, ReadScope};

/// One leaderboard row for a model's reported snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub model: String,
    #[serde(flatten)]
    pub stats: WindowedAggregate,
    pub latest_snapshot_id: SnapshotId,
    /// External run id of the newest snapshot, for deep links.
    pub latest_run_id: Option<String>,
    pub latest_run_time: DateTime<Utc>,
}

/// Thin API layer over a score snapshot store.
pub struct ScoreBoard<S> {
    store: S,
    config: BoardConfig,
}

impl<S> ScoreBoard<S>
where
    S: ScoreStore,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, BoardConfig::default())
    }

    pub fn with_config(store: S, config: BoardConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append a snapshot. Every call is a new historical point.
    pub async fn record(&self, snapshot: NewScoreSnapshot) -> Result<ScoreSnapshot> {
        ensure_finite_scores(&snapshot)?;
        let stored = self.store.append(snapshot).await?;
        METRICS.inc_snapshots_recorded();
        obs::emit_score_recorded(stored.id.as_str(), &stored.model, stored.total_score);
        Ok(stored)
    }

    /// Validate a raw submission payload, then record it.
    pub async fn submit(&self, body: &serde_json::Value) -> Result<ScoreSnapshot> {
        let submission = ScoreSubmission::from_json(body)?;
        self.record(submission.into_new_snapshot()).await
    }

    /// Last reported snapshot for `model`, not windowed.
    pub async fn latest(
        &self,
        model: &str,
        experiment: &ExperimentFilter,
    ) -> Result<Option<ScoreSnapshot>> {
        Ok(self.store.latest(model, experiment).await?)
    }

    /// Snapshots for `model`, oldest first. `limit` keeps the most recent
    /// entries without changing the order.
    pub async fn history(
        &self,
        model: &str,
        scope: &ReadScope,
        limit: Option<usize>,
    ) -> Result<Vec<ScoreSnapshot>> {
        let mut snapshots = self.scan(Some(model), scope).await?;
        snapshots.sort_by_key(|s| s.created_at);
        Ok(keep_most_recent(snapshots, limit))
    }

    /// Windowed statistics per model, sorted by model name.
    pub async fn list_all_scores(&self, scope: &ReadScope) -> Result<Vec<ScoreRow>> {
        scope.ensure_single_cohort()?;
        let snapshots = self.scan(None, scope).await?;

        let mut by_model: BTreeMap<String, Vec<ScoreSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            by_model
                .entry(snapshot.model.clone())
                .or_default()
                .push(snapshot);
        }

        let mut rows = Vec::with_capacity(by_model.len());
        for (model, mut snapshots) in by_model {
            snapshots.sort_by_key(|s| s.created_at);
            let Some(newest) = snapshots.last() else {
                continue;
            };
            let _span = obs::ModelSpan::enter(&model);

            let samples: Vec<ScoreSample<'_>> = snapshots.iter().map(ScoreSample::from).collect();
            let stats = aggregate(&samples, WINDOW_SIZE)?;
            METRICS.inc_aggregates();
            debug!(model = %model, run_count = stats.run_count, "aggregated snapshots");

            rows.push(ScoreRow {
                latest_snapshot_id: newest.id.clone(),
                latest_run_id: newest.external_run_id.clone(),
                latest_run_time: newest.created_at,
                model,
                stats,
            });
        }

        obs::emit_leaderboard_computed("snapshots", rows.len());
        Ok(rows)
    }

    /// Raw snapshots across all models, newest first.
    pub async fn list_all_snapshots(
        &self,
        scope: &ReadScope,
        limit: Option<usize>,
    ) -> Result<Vec<ScoreSnapshot>> {
        let mut snapshots = self.scan(None, scope).await?;
        snapshots.sort_by_key(|s| s.created_at);
        Ok(newest_first(snapshots, limit))
    }

    async fn scan(&self, model: Option<&str>, scope: &ReadScope) -> Result<Vec<ScoreSnapshot>> {
        let query = SnapshotQuery {
            model: model.map(str::to_string),
            experiment: scope.experiment.clone(),
            range: scope.resolve_range(&self.config, Utc::now()),
        };
        Ok(self.store.list(&query).await?)
    }
}
