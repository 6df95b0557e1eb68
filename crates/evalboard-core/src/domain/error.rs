//! Domain-level error taxonomy for evalboard.

use evalboard_state::StorageError;

/// A score cannot be computed from the supplied records.
///
/// Returned instead of a degenerate number so callers can filter such inputs
/// out before aggregating.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    #[error("cannot aggregate an empty window")]
    EmptyWindow,

    #[error("run {run_id} is {status}, only completed runs have a derived score")]
    RunNotCompleted { run_id: String, status: String },

    #[error("run {run_id} completed without any evals")]
    NoEvals { run_id: String },
}

/// Rejections at the score ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing or invalid model name")]
    InvalidModel,

    #[error("Missing or invalid scores object")]
    InvalidScores,

    #[error(
        "Invalid score format for category \"{category}\". Category must be a string and score must be a number."
    )]
    InvalidCategoryScore { category: String },

    #[error("Total score must be a number")]
    InvalidTotalScore,

    #[error("experiment tag must not be empty")]
    EmptyExperiment,

    #[error("invalid payload field {field}: expected a string")]
    InvalidField { field: String },

    #[error("Score for \"{field}\" must be a finite number")]
    NonFiniteScore { field: String },

    #[error("{field} must be a positive duration")]
    NonPositiveDuration { field: String },

    #[error("leaderboards are computed per experiment; pick one experiment or the default")]
    AllExperimentsOnLeaderboard,
}

/// Evalboard domain errors.
#[derive(Debug, thiserror::Error)]
pub enum EvalboardError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("score not computable: {0}")]
    Score(#[from] ScoreError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for evalboard domain operations.
pub type Result<T> = std::result::Result<T, EvalboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_message_names_category() {
        let err = ValidationError::InvalidCategoryScore {
            category: "fundamentals".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"fundamentals\""));
        assert!(msg.contains("score must be a number"));
    }

    #[test]
    fn test_storage_error_wraps() {
        let err: EvalboardError = StorageError::RunNotFound {
            run_id: "r1".to_string(),
        }
        .into();
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("r1"));
    }

    #[test]
    fn test_score_error_display() {
        let err = ScoreError::RunNotCompleted {
            run_id: "r1".to_string(),
            status: "pending".to_string(),
        };
        assert!(err.to_string().contains("only completed runs"));
    }
}
