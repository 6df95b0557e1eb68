//! Experiment cohort selection from caller-supplied arguments.

use evalboard_state::{ExperimentFilter, ExperimentTag};

use super::error::ValidationError;

/// Parse an optional experiment label.
///
/// Absent means the default cohort. A present but blank label is rejected
/// rather than silently widened to the default cohort.
pub fn parse_experiment(label: Option<&str>) -> Result<Option<ExperimentTag>, ValidationError> {
    match label {
        None => Ok(None),
        Some(label) => ExperimentTag::new(label)
            .map(Some)
            .ok_or(ValidationError::EmptyExperiment),
    }
}

/// Resolve `(experiment, include_all_experiments)` into a read filter.
pub fn experiment_filter(
    label: Option<&str>,
    include_all: bool,
) -> Result<ExperimentFilter, ValidationError> {
    Ok(ExperimentFilter::from_args(parse_experiment(label)?, include_all))
}
