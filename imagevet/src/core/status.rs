//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage's action completed and reported success.
    Success,
    /// The stage's action completed and reported a domain failure.
    Failure,
    /// The stage exceeded its configured timeout.
    TimedOut,
    /// The stage was never executed (disabled, or downstream of a halt).
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if this status halts the pipeline when the stage is required.
    #[must_use]
    pub fn is_halting(&self) -> bool {
        matches!(self, Self::Failure | Self::TimedOut)
    }

    /// Returns true if the stage ran and succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The aggregate verdict for a whole pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every required stage succeeded and no optional stage failed.
    Success,
    /// Every required stage succeeded but at least one optional stage failed.
    PartialFailure,
    /// At least one required stage failed or timed out.
    Failure,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::PartialFailure => write!(f, "partial_failure"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl OverallStatus {
    /// Returns the worse of two statuses.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        fn rank(status: OverallStatus) -> u8 {
            match status {
                OverallStatus::Success => 0,
                OverallStatus::PartialFailure => 1,
                OverallStatus::Failure => 2,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }

    /// Returns true if the invoking build system should treat the run as passing.
    ///
    /// Partial failures gate the build: the original harness refused to push
    /// images when any check failed.
    #[must_use]
    pub fn is_passing(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_status_display() {
        assert_eq!(StageStatus::Success.to_string(), "success");
        assert_eq!(StageStatus::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn stage_status_halting() {
        assert!(StageStatus::Failure.is_halting());
        assert!(StageStatus::TimedOut.is_halting());
        assert!(!StageStatus::Success.is_halting());
        assert!(!StageStatus::Skipped.is_halting());
    }

    #[test]
    fn stage_status_serializes_snake_case() {
        let json = serde_json::to_string(&StageStatus::TimedOut).unwrap();
        assert_eq!(json, r#""timed_out""#);
    }

    #[test]
    fn overall_status_worst() {
        assert_eq!(
            OverallStatus::Success.worst(OverallStatus::PartialFailure),
            OverallStatus::PartialFailure
        );
        assert_eq!(
            OverallStatus::Failure.worst(OverallStatus::PartialFailure),
            OverallStatus::Failure
        );
    }

    #[test]
    fn only_success_passes() {
        assert!(OverallStatus::Success.is_passing());
        assert!(!OverallStatus::PartialFailure.is_passing());
        assert!(!OverallStatus::Failure.is_passing());
    }
}
