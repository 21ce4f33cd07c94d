//! Error types for the imagevet harness.
//!
//! Action-level failures never cross the stage boundary as errors; they are
//! converted into outcome data by the stage runner. The types here cover the
//! remaining surfaces: configuration, report invariants, and publishing.

use thiserror::Error;

/// A domain failure reported by a stage action or collaborator.
///
/// Carries a human-readable message only; the stage runner records it as the
/// outcome's error detail.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StageActionError {
    /// The failure description.
    pub message: String,
}

impl StageActionError {
    /// Creates a new action error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StageActionError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// A durable-store operation failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    /// The failure description.
    pub message: String,
}

impl StoreError {
    /// Creates a new store error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised when a report is finalized before every stage was recorded.
///
/// This is an invariant violation inside the orchestration core, not a test
/// verdict; callers should treat it as fatal.
#[derive(Debug, Clone, Error)]
#[error("report finalized early: {recorded} of {expected} stage outcomes recorded")]
pub struct IncompleteReportError {
    /// The number of outcomes the report expected.
    pub expected: usize,
    /// The number of outcomes actually recorded.
    pub recorded: usize,
}

/// A single object that could not be published after all retries.
#[derive(Debug, Clone)]
pub struct PublishFailure {
    /// The destination key of the object.
    pub object: String,
    /// How many attempts were made.
    pub attempts: u32,
    /// The last error observed.
    pub reason: String,
}

/// Error raised when one or more objects could not be published.
///
/// Publishing failures are warnings about storage availability, not about the
/// software under test; they never change the report's overall status.
#[derive(Debug, Clone, Error)]
#[error("publish completed with {} failed object(s)", failures.len())]
pub struct PublishError {
    /// The objects that failed, in publish order.
    pub failures: Vec<PublishFailure>,
}

impl PublishError {
    /// Creates a publish error from a list of failures.
    #[must_use]
    pub fn new(failures: Vec<PublishFailure>) -> Self {
        Self { failures }
    }
}

/// Error raised while building the configuration from the environment.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("{0} is not set in the environment")]
    MissingVar(String),

    /// An environment variable holds a value that cannot be parsed.
    #[error("invalid value for {var}: {value}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// The offending value.
        value: String,
    },
}

/// Errors surfaced by the pipeline itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Two stages share a name.
    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),

    /// The pipeline was constructed with no stages.
    #[error("pipeline has no stages")]
    EmptyPipeline,

    /// The configured readiness marker is not a valid pattern.
    #[error("invalid readiness marker: {0}")]
    InvalidReadyMarker(String),

    /// The report invariant was violated.
    #[error(transparent)]
    IncompleteReport(#[from] IncompleteReportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_error_display() {
        let err = StageActionError::new("container never became ready");
        assert_eq!(err.to_string(), "container never became ready");
    }

    #[test]
    fn incomplete_report_display() {
        let err = IncompleteReportError {
            expected: 5,
            recorded: 3,
        };
        assert!(err.to_string().contains("3 of 5"));
    }

    #[test]
    fn publish_error_counts_failures() {
        let err = PublishError::new(vec![PublishFailure {
            object: "report.json".to_string(),
            attempts: 3,
            reason: "connection refused".to_string(),
        }]);
        assert_eq!(err.to_string(), "publish completed with 1 failed object(s)");
    }

    #[test]
    fn config_error_names_variable() {
        let err = ConfigError::MissingVar("IMAGE".to_string());
        assert_eq!(err.to_string(), "IMAGE is not set in the environment");
    }
}
