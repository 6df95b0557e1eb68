//! Read scoping shared by the score and run boards.

use chrono::{DateTime, Utc};
use evalboard_state::{ExperimentFilter, TimeRange};

use crate::config::BoardConfig;
use crate::domain::ValidationError;

/// Cohort and time window a read covers.
///
/// An unset `range` falls back to the board's configured look-back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadScope {
    pub experiment: ExperimentFilter,
    pub range: Option<TimeRange>,
}

impl ReadScope {
    pub fn new(experiment: ExperimentFilter) -> Self {
        Self {
            experiment,
            range: None,
        }
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Leaderboards window each model within one cohort, so mixing cohorts
    /// with `ExperimentFilter::All` is rejected there.
    pub(crate) fn ensure_single_cohort(&self) -> Result<(), ValidationError> {
        match self.experiment {
            ExperimentFilter::All => Err(ValidationError::AllExperimentsOnLeaderboard),
            _ => Ok(()),
        }
    }

    pub(crate) fn resolve_range(&self, config: &BoardConfig, now: DateTime<Utc>) -> TimeRange {
        self.range.unwrap_or_else(|| config.read_range(now))
    }
}

/// Keep the last `limit` items of an ascending sequence, preserving order.
///
/// `None` and `Some(0)` keep everything.
pub fn keep_most_recent<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit.filter(|l| *l > 0) {
        let excess = items.len().saturating_sub(limit);
        items.drain(..excess);
    }
    items
}

/// Reverse an ascending sequence to newest first and cap it at `limit`.
///
/// `None` and `Some(0)` keep everything.
pub fn newest_first<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    items.reverse();
    if let Some(limit) = limit.filter(|l| *l > 0) {
        items.truncate(limit);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn leaderboard_scope_must_name_one_cohort() {
        assert!(ReadScope::default().ensure_single_cohort().is_ok());
        assert_eq!(
            ReadScope::new(ExperimentFilter::All).ensure_single_cohort(),
            Err(ValidationError::AllExperimentsOnLeaderboard)
        );
    }

    #[test]
    fn keep_most_recent_stays_ascending() {
        assert_eq!(keep_most_recent(vec![1, 2, 3, 4, 5], Some(2)), vec![4, 5]);
        assert_eq!(keep_most_recent(vec![1, 2], Some(10)), vec![1, 2]);
        assert_eq!(keep_most_recent(vec![1, 2, 3], Some(0)), vec![1, 2, 3]);
        assert_eq!(keep_most_recent(vec![1, 2, 3], None), vec![1, 2, 3]);
    }

    #[test]
    fn newest_first_reverses_then_caps() {
        assert_eq!(newest_first(vec![1, 2, 3], Some(2)), vec![3, 2]);
        assert_eq!(newest_first(vec![1, 2, 3], None), vec![3, 2, 1]);
    }

    #[test]
    fn explicit_range_overrides_config() {
        let now = Utc::now();
        let config = BoardConfig::default().with_suggested_max_age();

        let configured = ReadScope::default().resolve_range(&config, now);
        assert_eq!(configured.start, Some(now - Duration::days(90)));

        let explicit = ReadScope::default()
            .with_range(TimeRange::unbounded())
            .resolve_range(&config, now);
        assert_eq!(explicit, TimeRange::unbounded());
    }
}
