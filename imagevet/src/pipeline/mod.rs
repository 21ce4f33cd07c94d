//! The pipeline state machine.
//!
//! Stages are fixed at construction and executed strictly in order. A
//! halting outcome in a required stage (or an external abort) moves the
//! pipeline to Halted: the remaining stages are recorded as Skipped, never
//! executed. Both terminal states finalize and publish exactly once, so a
//! failed run still produces a complete report.


use crate::cancellation::CancellationToken;
use crate::config::Config;
use crate::core::{Artifact, StageOutcome};
use crate::errors::{HarnessError, PublishError};
use crate::publish::ArtifactPublisher;
use crate::report::{PipelineReport, ReportAggregator};
use crate::runner::StageRunner;
use crate::stages::{
    Collaborators, LaunchAction, LogCaptureAction, ReadinessAction, RunContext, SbomAction,
    ScreenshotAction, StageDefinition,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// The result of one pipeline run.
#[derive(Debug)]
pub struct PipelineRun {
    /// The finalized report.
    pub report: PipelineReport,
    /// Publish failures, if any. Never affects the report's verdict.
    pub publish_warning: Option<PublishError>,
}

/// A single-use pipeline over one `image:tag`.
pub struct Pipeline {
    run: Arc<RunContext>,
    stages: Vec<StageDefinition>,
    runner: StageRunner,
    abort: CancellationToken,
    publisher: Arc<dyn ArtifactPublisher>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("image", &self.run.image_reference())
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline from an explicit stage list.
    ///
    /// Stage names must be unique and the list non-empty; ordering is fixed
    /// here and never changes at runtime.
    pub fn new(
        run: Arc<RunContext>,
        stages: Vec<StageDefinition>,
        publisher: Arc<dyn ArtifactPublisher>,
    ) -> Result<Self, HarnessError> {
        if stages.is_empty() {
            return Err(HarnessError::EmptyPipeline);
        }
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.clone()) {
                return Err(HarnessError::DuplicateStage(stage.name.clone()));
            }
        }

        let abort = CancellationToken::new();
        Ok(Self {
            run,
            stages,
            runner: StageRunner::new(abort.clone()),
            abort,
            publisher,
        })
    }

    /// Builds the standard validation pipeline for one tag.
    ///
    /// Launch, readiness, and log capture gate the run; screenshot (when
    /// enabled) and the software inventory are recorded but do not halt it.
    pub fn from_config(
        config: Arc<Config>,
        tag: &str,
        collaborators: Collaborators,
        publisher: Arc<dyn ArtifactPublisher>,
    ) -> Result<Self, HarnessError> {
        let mut stages = vec![
            StageDefinition::new(
                "launch",
                config.launch_timeout,
                true,
                Arc::new(LaunchAction),
            ),
            StageDefinition::new(
                "readiness",
                config.readiness_timeout,
                true,
                Arc::new(
                    ReadinessAction::new(&config.ready_marker)
                        .map_err(|err| HarnessError::InvalidReadyMarker(err.to_string()))?,
                ),
            ),
            StageDefinition::new(
                "logs",
                config.logs_timeout,
                true,
                Arc::new(LogCaptureAction),
            ),
        ];
        if config.screenshot_enabled {
            stages.push(StageDefinition::new(
                "screenshot",
                config.screenshot_timeout,
                false,
                Arc::new(ScreenshotAction),
            ));
        }
        stages.push(StageDefinition::new(
            "sbom",
            config.sbom_timeout,
            false,
            Arc::new(SbomAction),
        ));

        let run = Arc::new(RunContext::new(config, tag, collaborators));
        Self::new(run, stages, publisher)
    }

    /// Returns a token that aborts the run from outside.
    ///
    /// Aborting cancels the currently running stage immediately and halts
    /// the pipeline exactly as a required-stage failure would.
    #[must_use]
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Executes the pipeline to completion.
    ///
    /// Consumes `self`: a pipeline instance runs exactly once; re-running
    /// requires a fresh instance with a fresh report.
    pub async fn run(self) -> Result<PipelineRun, HarnessError> {
        let image_reference = self.run.image_reference();
        info!(image = %image_reference, stages = self.stages.len(), "pipeline started");

        let mut aggregator = ReportAggregator::new(
            &image_reference,
            self.run.config().tags.clone(),
            self.stages.len(),
        );
        let mut artifacts: Vec<Artifact> = Vec::new();
        let mut halted = false;

        for stage in &self.stages {
            if !halted && self.abort.is_cancelled() {
                aggregator.mark_aborted();
                halted = true;
            }
            if halted {
                aggregator.record(StageOutcome::skipped(&stage.name, stage.required));
                continue;
            }

            let execution = self.runner.run(stage, &self.run).await;
            if self.abort.is_cancelled() {
                warn!(stage = %stage.name, status = %execution.outcome.status, "pipeline aborted");
                aggregator.mark_aborted();
                halted = true;
            } else if stage.required && execution.outcome.status.is_halting() {
                warn!(stage = %stage.name, status = %execution.outcome.status, "pipeline halted");
                halted = true;
            }
            artifacts.extend(execution.artifacts);
            aggregator.record(execution.outcome);
        }

        self.teardown().await;

        let report = aggregator.finalize()?;
        info!(image = %image_reference, status = %report.overall_status, "pipeline finished");

        let publish_warning = match self.publisher.publish(&report, &artifacts).await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %err, "publishing incomplete");
                Some(err)
            }
        };

        Ok(PipelineRun {
            report,
            publish_warning,
        })
    }

    /// Stops the container if one was started. Runs on both terminal paths;
    /// `stop` is idempotent, so overlapping with cancellation cleanup is
    /// harmless.
    async fn teardown(&self) {
        if let Some(handle) = self.run.container() {
            if let Err(err) = self.run.runtime().stop(&handle).await {
                warn!(container = %handle.id, error = %err, "container teardown failed");
            }
        }
    }
}
