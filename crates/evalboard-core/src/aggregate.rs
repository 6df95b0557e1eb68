//! Windowed score aggregation.
//!
//! Both score producers (reported snapshots and run-derived scores) adapt
//! their records into [`ScoreSample`] and share [`aggregate`], so the
//! leaderboard statistics are computed the same way regardless of source.
//!
//! Statistics use the population standard deviation (divide by `n`), so a
//! single sample always has an error bar of exactly `0`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use evalboard_state::ScoreSnapshot;
use serde::{Deserialize, Serialize};

use crate::domain::ScoreError;

/// Number of most recent samples the leaderboard statistics cover.
pub const WINDOW_SIZE: usize = 5;

/// One score observation in the shape the aggregator consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSample<'a> {
    pub created_at: DateTime<Utc>,
    pub total_score: f64,
    pub scores: &'a BTreeMap<String, f64>,
}

impl<'a> From<&'a ScoreSnapshot> for ScoreSample<'a> {
    fn from(snapshot: &'a ScoreSnapshot) -> Self {
        ScoreSample {
            created_at: snapshot.created_at,
            total_score: snapshot.total_score,
            scores: &snapshot.scores,
        }
    }
}

/// Mean and error bars over the most recent window of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowedAggregate {
    pub total_score: f64,
    pub total_score_error_bar: f64,
    /// Per-category means. A category is present only if at least one
    /// windowed sample reported it.
    pub scores: BTreeMap<String, f64>,
    pub score_error_bars: BTreeMap<String, f64>,
    /// Number of samples in the full history, not just the window.
    pub run_count: usize,
}

/// Aggregate the most recent `window` samples.
///
/// Samples are ordered by `created_at` here; input order does not matter.
/// Category keys are union-merged across the window, and a sample that lacks
/// a category is left out of that category's statistics rather than counted
/// as zero.
pub fn aggregate(
    samples: &[ScoreSample<'_>],
    window: usize,
) -> Result<WindowedAggregate, ScoreError> {
    if samples.is_empty() || window == 0 {
        return Err(ScoreError::EmptyWindow);
    }

    let mut ordered: Vec<&ScoreSample<'_>> = samples.iter().collect();
    ordered.sort_by_key(|s| s.created_at);
    let recent = &ordered[ordered.len().saturating_sub(window)..];

    let totals: Vec<f64> = recent.iter().map(|s| s.total_score).collect();
    let (total_score, total_score_error_bar) =
        mean_and_std_dev(&totals).ok_or(ScoreError::EmptyWindow)?;

    let mut by_category: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for sample in recent {
        for (category, value) in sample.scores {
            by_category.entry(category.as_str()).or_default().push(*value);
        }
    }

    let mut scores = BTreeMap::new();
    let mut score_error_bars = BTreeMap::new();
    for (category, values) in by_category {
        if let Some((mean, std_dev)) = mean_and_std_dev(&values) {
            scores.insert(category.to_string(), mean);
            score_error_bars.insert(category.to_string(), std_dev);
        }
    }

    Ok(WindowedAggregate {
        total_score,
        total_score_error_bar,
        scores,
        score_error_bars,
        run_count: samples.len(),
    })
}

/// Mean and population standard deviation. `None` for an empty slice.
pub fn mean_and_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    match values {
        [] => None,
        [only] => Some((*only, 0.0)),
        _ => {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            Some((mean, variance.sqrt()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const EPS: f64 = 1e-9;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    struct Fixture {
        base: DateTime<Utc>,
        scores: Vec<(f64, BTreeMap<String, f64>)>,
    }

    impl Fixture {
        fn totals(totals: &[f64]) -> Self {
            Self {
                base: Utc::now(),
                scores: totals.iter().map(|t| (*t, BTreeMap::new())).collect(),
            }
        }

        fn with_categories(rows: Vec<(f64, Vec<(&str, f64)>)>) -> Self {
            Self {
                base: Utc::now(),
                scores: rows
                    .into_iter()
                    .map(|(t, cats)| {
                        let map = cats.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
                        (t, map)
                    })
                    .collect(),
            }
        }

        fn samples(&self) -> Vec<ScoreSample<'_>> {
            self.scores
                .iter()
                .enumerate()
                .map(|(i, (total, scores))| ScoreSample {
                    created_at: self.base + Duration::seconds(i as i64),
                    total_score: *total,
                    scores,
                })
                .collect()
        }
    }

    #[test]
    fn empty_input_is_not_computable() {
        assert_eq!(aggregate(&[], WINDOW_SIZE), Err(ScoreError::EmptyWindow));
    }

    #[test]
    fn single_sample_has_zero_error_bar() {
        let fx = Fixture::totals(&[0.42]);
        let agg = aggregate(&fx.samples(), WINDOW_SIZE).unwrap();
        assert_eq!(agg.total_score, 0.42);
        assert_eq!(agg.total_score_error_bar, 0.0);
        assert_eq!(agg.run_count, 1);
    }

    #[test]
    fn two_samples_use_population_std_dev() {
        let fx = Fixture::totals(&[60.0, 80.0]);
        let agg = aggregate(&fx.samples(), WINDOW_SIZE).unwrap();
        assert!(approx(agg.total_score, 70.0));
        assert!(approx(agg.total_score_error_bar, 10.0));
    }

    #[test]
    fn three_samples() {
        let fx = Fixture::totals(&[0.8, 0.9, 1.0]);
        let agg = aggregate(&fx.samples(), WINDOW_SIZE).unwrap();
        assert!(approx(agg.total_score, 0.9));
        assert!((agg.total_score_error_bar - 0.0816).abs() < 1e-4);
        assert_eq!(agg.run_count, 3);
    }

    #[test]
    fn window_keeps_most_recent_five() {
        let fx = Fixture::totals(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        let agg = aggregate(&fx.samples(), WINDOW_SIZE).unwrap();
        assert!(approx(agg.total_score, 50.0));
        assert!((agg.total_score_error_bar - 14.142_135_6).abs() < 1e-6);
        assert_eq!(agg.run_count, 7);
    }

    #[test]
    fn samples_outside_window_do_not_matter() {
        let a = Fixture::totals(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        let b = Fixture::totals(&[999.0, -5.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        let agg_a = aggregate(&a.samples(), WINDOW_SIZE).unwrap();
        let agg_b = aggregate(&b.samples(), WINDOW_SIZE).unwrap();
        assert_eq!(agg_a, agg_b);
    }

    #[test]
    fn input_order_is_irrelevant() {
        let fx = Fixture::totals(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        let mut samples = fx.samples();
        samples.reverse();
        let agg = aggregate(&samples, WINDOW_SIZE).unwrap();
        assert!(approx(agg.total_score, 50.0));
    }

    #[test]
    fn categories_union_merge_and_skip_missing() {
        let fx = Fixture::with_categories(vec![
            (1.0, vec![("a", 1.0)]),
            (0.5, vec![("a", 0.0), ("b", 0.5)]),
            (0.0, vec![("b", 1.0)]),
        ]);
        let agg = aggregate(&fx.samples(), WINDOW_SIZE).unwrap();

        assert_eq!(agg.scores.len(), 2);
        assert!(approx(agg.scores["a"], 0.5));
        assert!(approx(agg.score_error_bars["a"], 0.5));
        assert!(approx(agg.scores["b"], 0.75));
        assert!(approx(agg.score_error_bars["b"], 0.25));
    }

    #[test]
    fn category_seen_only_outside_window_is_absent() {
        let mut rows = vec![(1.0, vec![("legacy", 1.0)])];
        for _ in 0..5 {
            rows.push((1.0, vec![("current", 1.0)]));
        }
        let fx = Fixture::with_categories(rows);
        let agg = aggregate(&fx.samples(), WINDOW_SIZE).unwrap();
        assert!(!agg.scores.contains_key("legacy"));
        assert_eq!(agg.scores.get("current"), Some(&1.0));
    }

    #[test]
    fn mean_and_std_dev_edge_cases() {
        assert_eq!(mean_and_std_dev(&[]), None);
        assert_eq!(mean_and_std_dev(&[3.0]), Some((3.0, 0.0)));
        let (mean, sd) = mean_and_std_dev(&[1.0, 0.0]).unwrap();
        assert!(approx(mean, 0.5));
        assert!(approx(sd, 0.5));
    }
}
