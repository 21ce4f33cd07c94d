//! Core value types shared across the harness.

mod artifact;
mod outcome;
mod status;

pub use artifact::{Artifact, ArtifactKind, ArtifactRef};
pub use outcome::StageOutcome;
pub use status::{OverallStatus, StageStatus};
