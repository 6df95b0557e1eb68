//! Structured observability hooks for leaderboard events.
//!
//! - Model-scoped tracing spans via the `ModelSpan` RAII guard
//! - Emission functions for recording, leaderboard computation, skipped runs
//!   and maintenance

use tracing::{info, warn};

/// RAII guard that enters a model-scoped tracing span.
///
/// ```ignore
/// let _span = ModelSpan::enter("gpt-4o");
/// // tracing calls here carry model = "gpt-4o"
/// ```
pub struct ModelSpan {
    _span: tracing::span::EnteredSpan,
}

impl ModelSpan {
    pub fn enter(model: &str) -> Self {
        let span = tracing::info_span!("evalboard.model", model = %model);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_score_recorded(snapshot_id: &str, model: &str, total_score: f64) {
    info!(
        event = "score.recorded",
        snapshot_id = %snapshot_id,
        model = %model,
        total_score = total_score,
    );
}

/// Emit event: leaderboard rows computed from a given source.
pub fn emit_leaderboard_computed(source: &str, models: usize) {
    info!(event = "leaderboard.computed", source = %source, models = models);
}

/// Emit event: a completed run was left out of the statistics (warning level).
pub fn emit_run_skipped(run_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "run.skipped", run_id = %run_id, reason = %reason);
}

pub fn emit_run_auto_failed(run_id: &str, stuck_in: &str, elapsed_minutes: i64) {
    info!(
        event = "run.auto_failed",
        run_id = %run_id,
        stuck_in = %stuck_in,
        elapsed_minutes = elapsed_minutes,
    );
}
