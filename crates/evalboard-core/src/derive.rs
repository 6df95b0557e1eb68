//! Scores derived from a run's pass/fail evals.
//!
//! The total is the pass rate over every eval in the run, not the mean of
//! the per-category pass rates. The two differ whenever categories have
//! unequal eval counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use evalboard_state::{EvalRecord, ExperimentTag, RunId, RunRecord, RunStatus};
use serde::{Deserialize, Serialize};

use crate::aggregate::ScoreSample;
use crate::domain::ScoreError;

/// Eval tallies for one run. `pending` covers every eval not yet passed or
/// failed, including running ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
}

impl EvalCounts {
    pub fn from_evals<'a>(evals: impl IntoIterator<Item = &'a EvalRecord>) -> Self {
        let mut counts = EvalCounts::default();
        for eval in evals {
            counts.total += 1;
            if eval.status.is_passed() {
                counts.passed += 1;
            } else if eval.status.is_failed() {
                counts.failed += 1;
            }
        }
        counts.pending = counts.total - counts.passed - counts.failed;
        counts
    }

    /// Passed over total; `None` when there are no evals.
    pub fn pass_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.passed as f64 / self.total as f64)
    }
}

/// A snapshot-shaped score computed from a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedScore {
    pub run_id: RunId,
    pub model: String,
    pub experiment: Option<ExperimentTag>,
    pub total_score: f64,
    pub scores: BTreeMap<String, f64>,
    pub counts: EvalCounts,
    pub created_at: DateTime<Utc>,
}

impl DerivedScore {
    pub fn sample(&self) -> ScoreSample<'_> {
        ScoreSample {
            created_at: self.created_at,
            total_score: self.total_score,
            scores: &self.scores,
        }
    }
}

/// Derive the score of a completed run from its evals.
///
/// `evals` must be the evals belonging to `run`.
pub fn derived_score(run: &RunRecord, evals: &[EvalRecord]) -> Result<DerivedScore, ScoreError> {
    if !matches!(run.status, RunStatus::Completed { .. }) {
        return Err(ScoreError::RunNotCompleted {
            run_id: run.id.to_string(),
            status: run.status.kind().to_string(),
        });
    }

    let counts = EvalCounts::from_evals(evals);
    let total_score = counts.pass_rate().ok_or_else(|| ScoreError::NoEvals {
        run_id: run.id.to_string(),
    })?;

    let mut by_category: BTreeMap<&str, Vec<&EvalRecord>> = BTreeMap::new();
    for eval in evals {
        by_category.entry(eval.category.as_str()).or_default().push(eval);
    }

    let scores = by_category
        .into_iter()
        .filter_map(|(category, evals)| {
            EvalCounts::from_evals(evals)
                .pass_rate()
                .map(|rate| (category.to_string(), rate))
        })
        .collect();

    Ok(DerivedScore {
        run_id: run.id.clone(),
        model: run.model.clone(),
        experiment: run.experiment.clone(),
        total_score,
        scores,
        counts,
        created_at: run.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalboard_state::{EvalId, EvalStatus, NewRun};

    fn completed_run() -> RunRecord {
        let mut run = NewRun::new("m").into_record(RunId::from("run-1"), Utc::now());
        run.status = RunStatus::Completed { duration_ms: 5000 };
        run
    }

    fn eval(run: &RunRecord, category: &str, passed: bool) -> EvalRecord {
        EvalRecord {
            id: EvalId::new(),
            run_id: run.id.clone(),
            eval_path: format!("{category}/x"),
            category: category.to_string(),
            name: "x".to_string(),
            status: if passed {
                EvalStatus::Passed { duration_ms: 1000 }
            } else {
                EvalStatus::Failed {
                    failure_reason: "test failure".to_string(),
                    duration_ms: 1000,
                }
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn total_is_pass_rate_over_all_evals() {
        let run = completed_run();
        let evals = vec![
            eval(&run, "a", true),
            eval(&run, "a", false),
            eval(&run, "b", true),
            eval(&run, "b", true),
            eval(&run, "b", true),
        ];
        let score = derived_score(&run, &evals).unwrap();
        assert_eq!(score.scores["a"], 0.5);
        assert_eq!(score.scores["b"], 1.0);
        assert_eq!(score.total_score, 0.8);
    }

    #[test]
    fn two_categories_even_counts() {
        let run = completed_run();
        let evals = vec![
            eval(&run, "cat1", true),
            eval(&run, "cat1", false),
            eval(&run, "cat2", true),
            eval(&run, "cat2", true),
        ];
        let score = derived_score(&run, &evals).unwrap();
        assert_eq!(score.scores["cat1"], 0.5);
        assert_eq!(score.scores["cat2"], 1.0);
        assert_eq!(score.total_score, 0.75);
        assert_eq!(score.run_id, run.id);
        assert_eq!(score.created_at, run.created_at);
    }

    #[test]
    fn non_completed_runs_are_not_computable() {
        let mut run = completed_run();
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Failed {
                failure_reason: "crash".to_string(),
                duration_ms: 1,
            },
        ] {
            run.status = status;
            let err = derived_score(&run, &[]).unwrap_err();
            assert!(matches!(err, ScoreError::RunNotCompleted { .. }));
        }
    }

    #[test]
    fn completed_run_without_evals_is_not_computable() {
        let run = completed_run();
        assert_eq!(
            derived_score(&run, &[]).unwrap_err(),
            ScoreError::NoEvals {
                run_id: "run-1".to_string()
            }
        );
    }

    #[test]
    fn pending_evals_count_against_the_pass_rate() {
        let run = completed_run();
        let mut unfinished = eval(&run, "cat1", true);
        unfinished.status = EvalStatus::Running;
        let evals = vec![eval(&run, "cat1", true), unfinished];

        let score = derived_score(&run, &evals).unwrap();
        assert_eq!(score.total_score, 0.5);
        assert_eq!(
            score.counts,
            EvalCounts {
                total: 2,
                passed: 1,
                failed: 0,
                pending: 1
            }
        );
    }
}
