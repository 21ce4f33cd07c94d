//! Per-stage outcome records.

use super::{ArtifactRef, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The recorded result of one stage.
///
/// Exactly one outcome exists per stage in a run. Skipped stages carry no
/// timestamps; failed and timed-out stages carry an error detail. Artifacts
/// emitted before a failure or timeout are still attached so diagnostics
/// survive the stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage's unique name.
    pub stage_name: String,

    /// How the stage ended.
    pub status: StageStatus,

    /// Whether a halting status in this stage stops the pipeline.
    pub required: bool,

    /// When execution started (absent for skipped stages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When execution ended (absent for skipped stages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// The failure description (present iff status is Failure or TimedOut).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// References to artifacts the stage produced, in production order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub produced_artifacts: Vec<ArtifactRef>,
}

impl StageOutcome {
    /// Creates a success outcome.
    #[must_use]
    pub fn success(
        stage_name: impl Into<String>,
        required: bool,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        produced_artifacts: Vec<ArtifactRef>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Success,
            required,
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            error_detail: None,
            produced_artifacts,
        }
    }

    /// Creates a failure outcome.
    #[must_use]
    pub fn failure(
        stage_name: impl Into<String>,
        required: bool,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        error_detail: impl Into<String>,
        produced_artifacts: Vec<ArtifactRef>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Failure,
            required,
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            error_detail: Some(error_detail.into()),
            produced_artifacts,
        }
    }

    /// Creates a timed-out outcome.
    #[must_use]
    pub fn timed_out(
        stage_name: impl Into<String>,
        required: bool,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        error_detail: impl Into<String>,
        produced_artifacts: Vec<ArtifactRef>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::TimedOut,
            required,
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            error_detail: Some(error_detail.into()),
            produced_artifacts,
        }
    }

    /// Creates a skipped outcome. Skipped stages never executed, so no
    /// timestamps or artifacts are attached.
    #[must_use]
    pub fn skipped(stage_name: impl Into<String>, required: bool) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Skipped,
            required,
            started_at: None,
            ended_at: None,
            error_detail: None,
            produced_artifacts: Vec::new(),
        }
    }

    /// Returns the wall-clock duration of the stage, if it executed.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
