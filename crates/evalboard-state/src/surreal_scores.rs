//! SurrealDB-backed ScoreStore implementation
//!
//! Uses `schema::ScoreSnapshotRow` for persistence, converting to/from
//! `storage_traits` types at the boundary. The model filter and ordering
//! run in SurrealQL; experiment and time-range filters reuse
//! `SnapshotQuery::matches` so every backend agrees on cohort semantics.

use async_trait::async_trait;
use tracing::debug;

use crate::clock::MonotonicClock;
use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::ScoreSnapshotRow;
use crate::storage_traits::{
    ExperimentFilter, NewScoreSnapshot, ScoreSnapshot, ScoreStore, SnapshotId, SnapshotQuery,
    StorageResult,
};

/// SurrealDB-backed implementation of [`ScoreStore`].
pub struct SurrealScoreStore {
    handle: SurrealHandle,
    clock: MonotonicClock,
}

impl SurrealScoreStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self {
            handle,
            clock: MonotonicClock::new(),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(SurrealHandle::in_memory().await?))
    }

    async fn select_rows(
        &self,
        model: Option<&str>,
        descending: bool,
    ) -> StorageResult<Vec<ScoreSnapshotRow>> {
        let order = if descending { "DESC" } else { "ASC" };
        let mut res = match model {
            Some(model) => {
                let sql = format!(
                    "SELECT * FROM score_snapshots WHERE model = $model ORDER BY created_at {order}"
                );
                self.handle
                    .db()
                    .query(sql)
                    .bind(("model", model.to_string()))
                    .await?
            }
            None => {
                let sql = format!("SELECT * FROM score_snapshots ORDER BY created_at {order}");
                self.handle.db().query(sql).await?
            }
        };
        let rows: Vec<ScoreSnapshotRow> = res.take(0)?;
        Ok(rows)
    }
}

#[async_trait]
impl ScoreStore for SurrealScoreStore {
    async fn append(&self, snapshot: NewScoreSnapshot) -> StorageResult<ScoreSnapshot> {
        let stored = snapshot.into_snapshot(SnapshotId::new(), self.clock.now());
        debug!(snapshot_id = %stored.id, model = %stored.model, "appending score snapshot");

        let _created: Option<ScoreSnapshotRow> = self
            .handle
            .db()
            .create("score_snapshots")
            .content(ScoreSnapshotRow::from(&stored))
            .await?;

        Ok(stored)
    }

    async fn get(&self, id: &SnapshotId) -> StorageResult<ScoreSnapshot> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM score_snapshots WHERE snapshot_id = $sid")
            .bind(("sid", id.0.clone()))
            .await?;
        let rows: Vec<ScoreSnapshotRow> = res.take(0)?;

        rows.into_iter()
            .next()
            .map(ScoreSnapshot::from)
            .ok_or_else(|| StorageError::SnapshotNotFound {
                snapshot_id: id.0.clone(),
            })
    }

    async fn latest(
        &self,
        model: &str,
        experiment: &ExperimentFilter,
    ) -> StorageResult<Option<ScoreSnapshot>> {
        let rows = self.select_rows(Some(model), true).await?;
        Ok(rows
            .into_iter()
            .map(ScoreSnapshot::from)
            .find(|s| experiment.matches(s.experiment.as_ref())))
    }

    async fn list(&self, query: &SnapshotQuery) -> StorageResult<Vec<ScoreSnapshot>> {
        let rows = self.select_rows(query.model.as_deref(), false).await?;
        Ok(rows
            .into_iter()
            .map(ScoreSnapshot::from)
            .filter(|s| query.matches(s))
            .collect())
    }
}
