//! SurrealDB schema migrations and initialization
//!
//! Sets up the evalboard tables with their indexes. Every statement uses
//! `IF NOT EXISTS`, so running it against an existing database is a no-op.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all evalboard tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing evalboard SurrealDB schema");

    init_score_snapshots_table(db).await?;
    init_runs_table(db).await?;
    init_evals_table(db).await?;

    info!("evalboard schema initialization complete");
    Ok(())
}

/// Initialize `score_snapshots` table
///
/// Schema:
/// ```text
/// TABLE score_snapshots {
///   snapshot_id:      STRING (unique)
///   model:            STRING (indexed)
///   experiment:       STRING? (absent = default cohort)
///   total_score:      FLOAT
///   scores:           OBJECT (category -> FLOAT)
///   external_run_id:  STRING?
///   created_at:       DATETIME (indexed)
/// }
/// ```
///
/// Snapshots are append-only: updates and deletes are not permitted.
async fn init_score_snapshots_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing score_snapshots table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS score_snapshots
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_snapshot_id ON TABLE score_snapshots COLUMNS snapshot_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_model ON TABLE score_snapshots COLUMNS model;
        DEFINE INDEX IF NOT EXISTS idx_model_created_at ON TABLE score_snapshots COLUMNS model, created_at;
        DEFINE INDEX IF NOT EXISTS idx_created_at ON TABLE score_snapshots COLUMNS created_at;
    "#;

    db.query(sql).await?.check()?;
    info!("score_snapshots table initialized");
    Ok(())
}

/// Initialize `runs` table
///
/// Schema:
/// ```text
/// TABLE runs {
///   run_id:          STRING (unique)
///   model:           STRING (indexed)
///   formatted_name:  STRING?
///   provider:        STRING?
///   run_label:       STRING?
///   planned_evals:   ARRAY<STRING>
///   experiment:      STRING?
///   status:          STRING (pending | running | completed | failed)
///   failure_reason:  STRING?
///   duration_ms:     INT?
///   created_at:      DATETIME (indexed)
/// }
/// ```
///
/// Status transitions are single conditional `UPDATE` statements issued by
/// the store.
async fn init_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing runs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS runs
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE runs COLUMNS run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_model ON TABLE runs COLUMNS model;
        DEFINE INDEX IF NOT EXISTS idx_status ON TABLE runs COLUMNS status;
        DEFINE INDEX IF NOT EXISTS idx_created_at ON TABLE runs COLUMNS created_at;
    "#;

    db.query(sql).await?.check()?;
    info!("runs table initialized");
    Ok(())
}

/// Initialize `evals` table
///
/// Schema:
/// ```text
/// TABLE evals {
///   eval_id:         STRING (unique)
///   run_id:          STRING (indexed, references runs.run_id)
///   eval_path:       STRING
///   category:        STRING
///   name:            STRING
///   status:          STRING (pending | running | passed | failed)
///   failure_reason:  STRING?
///   duration_ms:     INT?
///   created_at:      DATETIME
/// }
/// ```
async fn init_evals_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing evals table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS evals
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_eval_id ON TABLE evals COLUMNS eval_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE evals COLUMNS run_id;
    "#;

    db.query(sql).await?.check()?;
    info!("evals table initialized");
    Ok(())
}
