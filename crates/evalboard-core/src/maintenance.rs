//! Periodic cleanup of runs whose runner died before finishing them.

use chrono::{DateTime, Duration, Utc};
use evalboard_state::{ExperimentFilter, RunQuery, RunStatus, RunStore, StorageError, TimeRange};
use tracing::{debug, info};

use crate::domain::{Result, ValidationError};
use crate::metrics::METRICS;
use crate::obs;

/// Mark runs still pending or running after `threshold` as failed.
///
/// Covers every experiment cohort. A run that reaches a terminal state
/// between the scan and the update is left alone. Returns the number of runs
/// failed. `threshold` must be positive.
pub async fn fail_stuck_runs<R>(store: &R, now: DateTime<Utc>, threshold: Duration) -> Result<usize>
where
    R: RunStore + ?Sized,
{
    if threshold <= Duration::zero() {
        return Err(ValidationError::NonPositiveDuration {
            field: "stuck run threshold".to_string(),
        }
        .into());
    }
    // A threshold reaching before the representable range leaves nothing stuck.
    let Some(cutoff) = now.checked_sub_signed(threshold) else {
        return Ok(0);
    };
    let query = RunQuery::all_models()
        .with_experiment(ExperimentFilter::All)
        .with_range(TimeRange {
            start: None,
            end: Some(cutoff),
        });

    let mut failed = 0;
    for run in store.list_runs(&query).await? {
        let stuck_in = match run.status {
            RunStatus::Pending | RunStatus::Running => run.status.kind(),
            _ => continue,
        };

        let elapsed = now - run.created_at;
        let minutes = elapsed.num_minutes();
        let reason = format!(
            "Run stuck in \"{stuck_in}\" state for {minutes} minutes; auto-failed by maintenance"
        );
        let duration_ms = u64::try_from(elapsed.num_milliseconds()).unwrap_or(0);

        match store.fail_run(&run.id, &reason, duration_ms).await {
            Ok(()) => {
                failed += 1;
                METRICS.inc_runs_auto_failed();
                obs::emit_run_auto_failed(run.id.as_str(), stuck_in.as_str(), minutes);
            }
            Err(StorageError::InvalidRunState { .. }) => {
                debug!(run_id = %run.id, "run finished before it could be auto-failed");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failed > 0 {
        info!("fail_stuck_runs: marked {} stuck run(s) as failed", failed);
    }
    Ok(failed)
}
