//! Error types for evalboard-state

use thiserror::Error;

/// Errors raised while connecting to or initializing the backing database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits (`ScoreStore`, `RunStore`)
#[derive(Error, Debug)]
pub enum StorageError {
    /// No snapshot with the given id
    #[error("snapshot not found: {snapshot_id}")]
    SnapshotNotFound { snapshot_id: String },

    /// No run with the given id
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// No eval with the given id
    #[error("eval not found: {eval_id}")]
    EvalNotFound { eval_id: String },

    /// A run status transition was attempted from the wrong state
    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    /// An eval status transition was attempted from the wrong state
    #[error("eval {eval_id} is {status}, expected {expected}")]
    InvalidEvalState {
        eval_id: String,
        status: String,
        expected: String,
    },

    /// Backend (database) failure, surfaced unchanged
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Row could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
