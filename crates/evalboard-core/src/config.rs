//! Board configuration.
//!
//! Reads optional overrides from the environment:
//! - `EVALBOARD_MAX_AGE_DAYS`: look-back for leaderboard and history reads
//!   (unset means no look-back limit)
//! - `EVALBOARD_STUCK_RUN_MINUTES`: age after which an unfinished run is
//!   auto-failed (default 180)
//! - `EVALBOARD_RUN_LIST_LIMIT`: default row cap for run listings (default 100)

use chrono::{DateTime, Duration, Utc};
use evalboard_state::TimeRange;

/// Suggested look-back for dashboard reads.
pub const SUGGESTED_MAX_AGE_DAYS: i64 = 90;

/// Unfinished runs older than this are considered stuck.
pub const DEFAULT_STUCK_RUN_MINUTES: i64 = 3 * 60;

/// Default number of rows returned by run listings.
pub const DEFAULT_RUN_LIST_LIMIT: usize = 100;

const MAX_AGE_VAR: &str = "EVALBOARD_MAX_AGE_DAYS";
const STUCK_RUN_VAR: &str = "EVALBOARD_STUCK_RUN_MINUTES";
const RUN_LIST_LIMIT_VAR: &str = "EVALBOARD_RUN_LIST_LIMIT";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Only records created within this age are read. `None` reads everything.
    pub max_age: Option<Duration>,
    pub stuck_run_threshold: Duration,
    pub run_list_limit: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            max_age: None,
            stuck_run_threshold: Duration::minutes(DEFAULT_STUCK_RUN_MINUTES),
            run_list_limit: DEFAULT_RUN_LIST_LIMIT,
        }
    }
}

impl BoardConfig {
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Use the suggested 90-day look-back.
    pub fn with_suggested_max_age(self) -> Self {
        self.with_max_age(Some(Duration::days(SUGGESTED_MAX_AGE_DAYS)))
    }

    pub fn with_stuck_run_threshold(mut self, threshold: Duration) -> Self {
        self.stuck_run_threshold = threshold;
        self
    }

    pub fn with_run_list_limit(mut self, limit: usize) -> Self {
        self.run_list_limit = limit;
        self
    }

    /// Time range covering the configured look-back as of `now`.
    pub fn read_range(&self, now: DateTime<Utc>) -> TimeRange {
        match self.max_age {
            Some(max_age) => TimeRange::since(max_age, now),
            None => TimeRange::unbounded(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; unset variables keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_AGE_VAR) {
            let days = parse_positive(MAX_AGE_VAR, &raw)?;
            config.max_age = Some(in_range(MAX_AGE_VAR, &raw, Duration::try_days(days))?);
        }
        if let Some(raw) = lookup(STUCK_RUN_VAR) {
            let minutes = parse_positive(STUCK_RUN_VAR, &raw)?;
            config.stuck_run_threshold =
                in_range(STUCK_RUN_VAR, &raw, Duration::try_minutes(minutes))?;
        }
        if let Some(raw) = lookup(RUN_LIST_LIMIT_VAR) {
            let limit = parse_positive(RUN_LIST_LIMIT_VAR, &raw)?;
            config.run_list_limit = usize::try_from(limit).map_err(|_| ConfigError::Invalid {
                var: RUN_LIST_LIMIT_VAR,
                value: raw.clone(),
                reason: "out of range",
            })?;
        }

        Ok(config)
    }
}

fn in_range(
    var: &'static str,
    raw: &str,
    duration: Option<Duration>,
) -> Result<Duration, ConfigError> {
    duration.ok_or_else(|| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: "out of range",
    })
}

fn parse_positive(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    let value: i64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: "not an integer",
    })?;
    if value <= 0 {
        return Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "must be positive",
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = BoardConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BoardConfig::default());
        assert_eq!(config.stuck_run_threshold, Duration::hours(3));
        assert_eq!(config.run_list_limit, 100);
        assert!(config.max_age.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = BoardConfig::from_lookup(lookup(&[
            ("EVALBOARD_MAX_AGE_DAYS", "90"),
            ("EVALBOARD_STUCK_RUN_MINUTES", "30"),
            ("EVALBOARD_RUN_LIST_LIMIT", "25"),
        ]))
        .unwrap();
        assert_eq!(config.max_age, Some(Duration::days(90)));
        assert_eq!(config.stuck_run_threshold, Duration::minutes(30));
        assert_eq!(config.run_list_limit, 25);
    }

    #[test]
    fn rejects_garbage_and_non_positive() {
        let err = BoardConfig::from_lookup(lookup(&[("EVALBOARD_MAX_AGE_DAYS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("EVALBOARD_MAX_AGE_DAYS"));

        assert!(BoardConfig::from_lookup(lookup(&[("EVALBOARD_RUN_LIST_LIMIT", "0")])).is_err());
        assert!(BoardConfig::from_lookup(lookup(&[("EVALBOARD_STUCK_RUN_MINUTES", "-60")])).is_err());
    }

    #[test]
    fn rejects_durations_chrono_cannot_represent() {
        let err = BoardConfig::from_lookup(lookup(&[("EVALBOARD_MAX_AGE_DAYS", "1000000000000")]))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let err = BoardConfig::from_lookup(lookup(&[(
            "EVALBOARD_STUCK_RUN_MINUTES",
            "9223372036854775807",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("EVALBOARD_STUCK_RUN_MINUTES"));
    }

    #[test]
    fn read_range_follows_max_age() {
        let now = Utc::now();
        assert_eq!(BoardConfig::default().read_range(now), TimeRange::unbounded());

        let range = BoardConfig::default()
            .with_suggested_max_age()
            .read_range(now);
        assert_eq!(range.start, Some(now - Duration::days(90)));
        assert!(range.end.is_none());
    }
}
