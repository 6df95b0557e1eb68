//! Global atomic counters for evalboard.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. before a CLI command exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    snapshots_recorded: AtomicU64,
    aggregates_computed: AtomicU64,
    runs_derived: AtomicU64,
    runs_skipped: AtomicU64,
    runs_auto_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            snapshots_recorded: AtomicU64::new(0),
            aggregates_computed: AtomicU64::new(0),
            runs_derived: AtomicU64::new(0),
            runs_skipped: AtomicU64::new(0),
            runs_auto_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_snapshots_recorded(&self) {
        self.snapshots_recorded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_recorded", "counter incremented");
    }

    pub fn inc_aggregates(&self) {
        self.aggregates_computed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "aggregates_computed", "counter incremented");
    }

    pub fn inc_runs_derived(&self) {
        self.runs_derived.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_derived", "counter incremented");
    }

    /// Completed runs that could not be scored (e.g. no evals).
    pub fn inc_runs_skipped(&self) {
        self.runs_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_skipped", "counter incremented");
    }

    pub fn inc_runs_auto_failed(&self) {
        self.runs_auto_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_auto_failed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            snapshots_recorded = self.snapshots_recorded(),
            aggregates_computed = self.aggregates_computed(),
            runs_derived = self.runs_derived(),
            runs_skipped = self.runs_skipped(),
            runs_auto_failed = self.runs_auto_failed(),
        );
    }

    pub fn snapshots_recorded(&self) -> u64 {
        self.snapshots_recorded.load(Ordering::Relaxed)
    }

    pub fn aggregates_computed(&self) -> u64 {
        self.aggregates_computed.load(Ordering::Relaxed)
    }

    pub fn runs_derived(&self) -> u64 {
        self.runs_derived.load(Ordering::Relaxed)
    }

    pub fn runs_skipped(&self) -> u64 {
        self.runs_skipped.load(Ordering::Relaxed)
    }

    pub fn runs_auto_failed(&self) -> u64 {
        self.runs_auto_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.snapshots_recorded.store(0, Ordering::Relaxed);
        self.aggregates_computed.store(0, Ordering::Relaxed);
        self.runs_derived.store(0, Ordering::Relaxed);
        self.runs_skipped.store(0, Ordering::Relaxed);
        self.runs_auto_failed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.snapshots_recorded(), 0);
        m.inc_snapshots_recorded();
        m.inc_snapshots_recorded();
        assert_eq!(m.snapshots_recorded(), 2);

        m.inc_aggregates();
        assert_eq!(m.aggregates_computed(), 1);

        m.inc_runs_derived();
        m.inc_runs_skipped();
        m.inc_runs_auto_failed();
        assert_eq!(m.runs_derived(), 1);
        assert_eq!(m.runs_skipped(), 1);
        assert_eq!(m.runs_auto_failed(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_snapshots_recorded();
        m.inc_aggregates();
        m.inc_runs_derived();
        m.reset();
        assert_eq!(m.snapshots_recorded(), 0);
        assert_eq!(m.aggregates_computed(), 0);
        assert_eq!(m.runs_derived(), 0);
    }
}
