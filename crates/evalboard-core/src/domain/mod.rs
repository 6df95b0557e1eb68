//! Domain types for evalboard.
//!
//! - `error`: score, validation and wrapped storage errors
//! - `experiment`: cohort selection from caller arguments
//! - `submission`: validated score submission payloads

pub mod error;
pub mod experiment;
pub mod submission;

pub use error::{EvalboardError, Result, ScoreError, ValidationError};
pub use experiment::{experiment_filter, parse_experiment};
pub use submission::{ensure_finite_scores, ScoreSubmission};
