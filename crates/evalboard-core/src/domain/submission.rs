//! Score submission payloads received at the ingestion boundary.
//!
//! A submission is the JSON body an external reporter posts after an
//! evaluation run:
//!
//! ```json
//! { "model": "gpt-4o", "scores": { "fundamentals": 0.9 }, "totalScore": 0.9 }
//! ```
//!
//! Optional `experiment` and `runId` fields tag the snapshot with a cohort
//! and a deep-link correlation id. Validation runs before anything touches
//! the store; the first failing check wins.

use std::collections::BTreeMap;

use evalboard_state::{ExperimentTag, NewScoreSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ValidationError;
use super::experiment::parse_experiment;

/// A validated score submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub model: String,
    pub scores: BTreeMap<String, f64>,
    pub total_score: f64,
    pub experiment: Option<ExperimentTag>,
    pub external_run_id: Option<String>,
}

impl ScoreSubmission {
    /// Validate a raw JSON payload.
    ///
    /// Checks, in order:
    /// 1. `model` is a non-empty string.
    /// 2. `scores` is an object.
    /// 3. Every category score is a number.
    /// 4. `totalScore` is a number.
    /// 5. `experiment` and `runId`, when present, are strings and the
    ///    experiment label is not blank.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let model = match body.get("model").and_then(Value::as_str) {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => return Err(ValidationError::InvalidModel),
        };

        let raw_scores = body
            .get("scores")
            .and_then(Value::as_object)
            .ok_or(ValidationError::InvalidScores)?;

        let mut scores = BTreeMap::new();
        for (category, score) in raw_scores {
            let score = score
                .as_f64()
                .ok_or_else(|| ValidationError::InvalidCategoryScore {
                    category: category.clone(),
                })?;
            scores.insert(category.clone(), score);
        }

        let total_score = body
            .get("totalScore")
            .and_then(Value::as_f64)
            .ok_or(ValidationError::InvalidTotalScore)?;

        let experiment = parse_experiment(optional_str(body, "experiment")?)?;
        let external_run_id = optional_str(body, "runId")?.map(str::to_string);

        Ok(Self {
            model,
            scores,
            total_score,
            experiment,
            external_run_id,
        })
    }

    /// Convert into the store's append payload.
    pub fn into_new_snapshot(self) -> NewScoreSnapshot {
        NewScoreSnapshot {
            model: self.model,
            experiment: self.experiment,
            total_score: self.total_score,
            scores: self.scores,
            external_run_id: self.external_run_id,
        }
    }
}

fn optional_str<'a>(body: &'a Value, field: &str) -> Result<Option<&'a str>, ValidationError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
        }),
    }
}

/// Reject NaN or infinite scores, which would poison every window they
/// fall into.
pub fn ensure_finite_scores(snapshot: &NewScoreSnapshot) -> Result<(), ValidationError> {
    if !snapshot.total_score.is_finite() {
        return Err(ValidationError::NonFiniteScore {
            field: "totalScore".to_string(),
        });
    }
    if let Some((category, _)) = snapshot.scores.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ValidationError::NonFiniteScore {
            field: category.clone(),
        });
    }
    Ok(())
}
