//! Report aggregation and rendering.
//!
//! The aggregator is the only writer of stage outcomes. `finalize` computes
//! the overall verdict and returns an immutable report; finalizing before
//! every stage (executed or skipped) was recorded is an invariant violation,
//! not a test failure.

use crate::core::{OverallStatus, StageOutcome};
use crate::errors::IncompleteReportError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The finalized record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Correlation id for this run.
    pub run_id: Uuid,
    /// The `image:tag` reference that was validated.
    pub image_reference: String,
    /// The full configured tag set for the image.
    pub tags: Vec<String>,
    /// The aggregate verdict.
    pub overall_status: OverallStatus,
    /// Per-stage outcomes, in execution order.
    pub stage_outcomes: Vec<StageOutcome>,
    /// When the report was finalized.
    pub generated_at: DateTime<Utc>,
}

impl PipelineReport {
    /// Serializes the report as pretty-printed JSON.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Renders the human-readable Markdown report.
    #[must_use]
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Test results for {}\n\n", self.image_reference));
        out.push_str(&format!("Overall status: **{}**\n\n", self.overall_status));
        out.push_str(&format!("Tags under test: {}\n\n", self.tags.join(", ")));
        out.push_str("| Stage | Required | Status | Duration | Detail |\n");
        out.push_str("| --- | --- | --- | --- | --- |\n");
        for outcome in &self.stage_outcomes {
            let duration = outcome
                .duration()
                .map_or_else(|| "-".to_string(), |d| format!("{}s", d.num_seconds()));
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                outcome.stage_name,
                if outcome.required { "yes" } else { "no" },
                outcome.status,
                duration,
                outcome.error_detail.as_deref().unwrap_or("-"),
            ));
        }

        let artifacts: Vec<String> = self
            .stage_outcomes
            .iter()
            .flat_map(|o| o.produced_artifacts.iter())
            .map(|a| format!("- {} ({}, {} bytes)", a.name, a.kind, a.size_bytes))
            .collect();
        if !artifacts.is_empty() {
            out.push_str("\n## Artifacts\n\n");
            out.push_str(&artifacts.join("\n"));
            out.push('\n');
        }

        out.push_str(&format!(
            "\nGenerated at {}\n",
            self.generated_at.to_rfc3339()
        ));
        out
    }
}

/// Accumulates per-stage outcomes into a single report.
#[derive(Debug)]
pub struct ReportAggregator {
    run_id: Uuid,
    image_reference: String,
    tags: Vec<String>,
    expected: usize,
    outcomes: Vec<StageOutcome>,
    aborted: bool,
}

impl ReportAggregator {
    /// Creates an empty aggregator expecting one outcome per pipeline stage.
    #[must_use]
    pub fn new(image_reference: impl Into<String>, tags: Vec<String>, expected: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            image_reference: image_reference.into(),
            tags,
            expected,
            outcomes: Vec::new(),
            aborted: false,
        }
    }

    /// Returns the run's correlation id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Appends one outcome in execution order.
    pub fn record(&mut self, outcome: StageOutcome) {
        self.outcomes.push(outcome);
    }

    /// Marks the run as externally aborted.
    ///
    /// An aborted run finalizes to Failure even when the interrupted stage
    /// was optional: the abort halted the pipeline, so the remaining checks
    /// never ran and the run cannot vouch for the image.
    pub fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    /// Computes the overall status and returns the immutable report.
    ///
    /// Consumes the aggregator: a run finalizes exactly once.
    pub fn finalize(self) -> Result<PipelineReport, IncompleteReportError> {
        if self.outcomes.len() != self.expected {
            return Err(IncompleteReportError {
                expected: self.expected,
                recorded: self.outcomes.len(),
            });
        }

        let required_failed = self
            .outcomes
            .iter()
            .any(|o| o.required && o.status.is_halting());
        let optional_failed = self
            .outcomes
            .iter()
            .any(|o| !o.required && o.status.is_halting());

        let overall_status = if required_failed || self.aborted {
            OverallStatus::Failure
        } else if optional_failed {
            OverallStatus::PartialFailure
        } else {
            OverallStatus::Success
        };

        Ok(PipelineReport {
            run_id: self.run_id,
            image_reference: self.image_reference,
            tags: self.tags,
            overall_status,
            stage_outcomes: self.outcomes,
            generated_at: Utc::now(),
        })
    }
}
