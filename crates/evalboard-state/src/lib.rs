//! Evalboard-State: record store for the evaluation leaderboard
//!
//! This crate is the persistence layer under the leaderboard statistics
//! engine. It stores externally reported score snapshots, evaluation runs and
//! their pass/fail evals, and answers the ordered range scans the statistics
//! need.
//!
//! ## Key Components
//!
//! - `ScoreStore` / `RunStore`: backend-agnostic async storage traits
//! - `fakes`: in-memory implementations for tests and throwaway sessions
//! - `SurrealScoreStore` / `SurrealRunStore`: SurrealDB implementations
//! - `SurrealHandle`: connection setup (in-memory, URL, credentials, env)
//! - `MonotonicClock`: strictly increasing `created_at` values

pub mod clock;
mod error;
pub mod fakes;
mod handle;
pub mod migrations;
pub mod schema;
pub mod storage_traits;
pub mod surreal_runs;
pub mod surreal_scores;

pub use clock::MonotonicClock;
pub use error::{StateError, StorageError};
pub use handle::{StoreConfig, SurrealHandle, DEFAULT_LOCAL_PATH};
pub use storage_traits::{
    EvalId, EvalRecord, EvalStatus, ExperimentFilter, ExperimentTag, NewEval, NewRun,
    NewScoreSnapshot, RunId, RunQuery, RunRecord, RunStatus, RunStatusKind, RunStore,
    ScoreSnapshot, ScoreStore, SnapshotId, SnapshotQuery, StorageResult, TimeRange,
};
pub use surreal_runs::SurrealRunStore;
pub use surreal_scores::SurrealScoreStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
