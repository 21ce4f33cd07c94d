//! Stage runner: executes one stage under timeout and abort control.
//!
//! The runner is the sole arbiter of the race between an action's natural
//! completion, its configured timeout, and a pipeline-level abort. The race
//! is biased: once the deadline elapses the outcome is TimedOut even if
//! completion was imminent, which gives the whole pipeline a hard upper
//! bound on duration.

use crate::cancellation::CancellationToken;
use crate::core::{Artifact, StageOutcome};
use crate::errors::StageActionError;
use crate::stages::{RunContext, StageContext, StageDefinition};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// A stage's outcome plus the artifact payloads it produced.
#[derive(Debug)]
pub struct StageExecution {
    /// The recorded outcome.
    pub outcome: StageOutcome,
    /// Artifact payloads, in production order.
    pub artifacts: Vec<Artifact>,
}

enum Verdict {
    Completed(Result<(), StageActionError>),
    DeadlineElapsed,
    Aborted,
}

/// Executes stages one at a time, translating every underlying failure into
/// outcome data. No action error escapes the runner as an error.
pub struct StageRunner {
    abort: CancellationToken,
    grace: Duration,
}

impl StageRunner {
    /// Creates a runner bound to a pipeline-level abort token.
    #[must_use]
    pub fn new(abort: CancellationToken) -> Self {
        Self {
            abort,
            grace: DEFAULT_GRACE,
        }
    }

    /// Overrides the cancellation grace period.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Runs one stage to an outcome.
    pub async fn run(&self, stage: &StageDefinition, run: &Arc<RunContext>) -> StageExecution {
        let started_at = Utc::now();
        let cancel = CancellationToken::new();
        let ctx = StageContext::new(run.clone(), stage.name.clone(), cancel.clone());

        info!(stage = %stage.name, timeout = ?stage.timeout, "stage started");

        let action = stage.action.run(&ctx);
        tokio::pin!(action);

        let verdict = {
            let deadline = tokio::time::sleep(stage.timeout);
            tokio::pin!(deadline);
            tokio::select! {
                biased;
                () = &mut deadline => Verdict::DeadlineElapsed,
                () = self.abort.cancelled() => Verdict::Aborted,
                result = &mut action => Verdict::Completed(result),
            }
        };

        let outcome = match verdict {
            Verdict::Completed(Ok(())) => {
                let ended_at = Utc::now();
                info!(stage = %stage.name, "stage succeeded");
                StageOutcome::success(&stage.name, stage.required, started_at, ended_at, Vec::new())
            }
            Verdict::Completed(Err(err)) => {
                let ended_at = Utc::now();
                warn!(stage = %stage.name, error = %err, "stage failed");
                StageOutcome::failure(
                    &stage.name,
                    stage.required,
                    started_at,
                    ended_at,
                    err.to_string(),
                    Vec::new(),
                )
            }
            Verdict::DeadlineElapsed => {
                cancel.cancel(format!(
                    "stage '{}' exceeded its timeout of {:?}",
                    stage.name, stage.timeout
                ));
                self.await_grace(&stage.name, &mut action).await;
                let ended_at = Utc::now();
                warn!(stage = %stage.name, timeout = ?stage.timeout, "stage timed out");
                StageOutcome::timed_out(
                    &stage.name,
                    stage.required,
                    started_at,
                    ended_at,
                    format!("exceeded configured timeout of {:?}", stage.timeout),
                    Vec::new(),
                )
            }
            Verdict::Aborted => {
                let reason = self
                    .abort
                    .reason()
                    .unwrap_or_else(|| "pipeline aborted".to_string());
                cancel.cancel(reason.clone());
                self.await_grace(&stage.name, &mut action).await;
                let ended_at = Utc::now();
                warn!(stage = %stage.name, %reason, "stage aborted");
                StageOutcome::failure(
                    &stage.name,
                    stage.required,
                    started_at,
                    ended_at,
                    reason,
                    Vec::new(),
                )
            }
        };
        drop(action);

        let artifacts = ctx.take_artifacts();
        let mut outcome = outcome;
        outcome.produced_artifacts = artifacts.iter().map(Artifact::reference).collect();

        StageExecution { outcome, artifacts }
    }

    /// Gives a cancelled action a bounded window to observe cancellation and
    /// release whatever it started. The runner never blocks past the grace
    /// period; an unfinished action is dropped with a warning that cleanup
    /// may be outstanding.
    async fn await_grace<F>(&self, stage_name: &str, action: &mut std::pin::Pin<&mut F>)
    where
        F: std::future::Future<Output = Result<(), StageActionError>>,
    {
        if tokio::time::timeout(self.grace, action.as_mut()).await.is_err() {
            warn!(
                stage = %stage_name,
                grace = ?self.grace,
                "action did not observe cancellation in time; external cleanup may be outstanding"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Artifact, ArtifactKind, StageStatus};
    use crate::stages::FnAction;
    use crate::testing;

    fn stage(
        name: &str,
        timeout: Duration,
        required: bool,
        action: Arc<dyn crate::stages::StageAction>,
    ) -> StageDefinition {
        StageDefinition::new(name, timeout, required, action)
    }

    fn run_ctx() -> Arc<RunContext> {
        Arc::new(testing::run_context("latest"))
    }

    #[tokio::test]
    async fn success_outcome_has_timestamps() {
        let runner = StageRunner::new(CancellationToken::new());
        let action = Arc::new(FnAction::new("ok", |_ctx| Box::pin(async { Ok(()) })));
        let stage = stage("launch", Duration::from_secs(5), true, action);

        let exec = runner.run(&stage, &run_ctx()).await;
        assert_eq!(exec.outcome.status, StageStatus::Success);
        assert!(exec.outcome.started_at.is_some());
        assert!(exec.outcome.ended_at.is_some());
        assert!(exec.outcome.error_detail.is_none());
    }

    #[tokio::test]
    async fn action_error_becomes_failure_outcome() {
        let runner = StageRunner::new(CancellationToken::new());
        let action = Arc::new(FnAction::new("boom", |_ctx| {
            Box::pin(async { Err(StageActionError::new("marker never seen")) })
        }));
        let stage = stage("readiness", Duration::from_secs(5), true, action);

        let exec = runner.run(&stage, &run_ctx()).await;
        assert_eq!(exec.outcome.status, StageStatus::Failure);
        assert_eq!(exec.outcome.error_detail.as_deref(), Some("marker never seen"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_action_times_out() {
        let runner = StageRunner::new(CancellationToken::new());
        let action = Arc::new(FnAction::new("slow", |_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(300)).await;
                Ok(())
            })
        }));
        let stage = stage("readiness", Duration::from_secs(120), true, action);

        let exec = runner.run(&stage, &run_ctx()).await;
        assert_eq!(exec.outcome.status, StageStatus::TimedOut);
        assert!(exec
            .outcome
            .error_detail
            .as_deref()
            .unwrap()
            .contains("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wins_when_completion_is_simultaneous() {
        let runner = StageRunner::new(CancellationToken::new());
        let action = Arc::new(FnAction::new("close-call", |_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(())
            })
        }));
        let stage = stage("readiness", Duration::from_secs(120), true, action);

        let exec = runner.run(&stage, &run_ctx()).await;
        assert_eq!(exec.outcome.status, StageStatus::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_action_finishes_within_grace() {
        let runner = StageRunner::new(CancellationToken::new());
        let action = Arc::new(FnAction::new("cooperative", |ctx| {
            Box::pin(async move {
                ctx.attach_artifact(Artifact::text("partial.log", ArtifactKind::Log, "boot"));
                ctx.cancel().cancelled().await;
                Err(StageActionError::new("cancelled"))
            })
        }));
        let stage = stage("readiness", Duration::from_secs(10), true, action);

        let exec = runner.run(&stage, &run_ctx()).await;
        // Still timed out even though the action settled during grace.
        assert_eq!(exec.outcome.status, StageStatus::TimedOut);
        // The artifact attached before cancellation survives.
        assert_eq!(exec.outcome.produced_artifacts.len(), 1);
        assert_eq!(exec.artifacts[0].name, "partial.log");
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_action_is_dropped_after_grace() {
        let runner = StageRunner::new(CancellationToken::new()).with_grace(Duration::from_secs(1));
        let action = Arc::new(FnAction::new("stubborn", |_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
        }));
        let stage = stage("launch", Duration::from_secs(5), true, action);

        let exec = runner.run(&stage, &run_ctx()).await;
        assert_eq!(exec.outcome.status, StageStatus::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cancels_running_stage() {
        let abort = CancellationToken::new();
        let runner = StageRunner::new(abort.clone());
        let action = Arc::new(FnAction::new("waits", |ctx| {
            Box::pin(async move {
                ctx.cancel().cancelled().await;
                Err(StageActionError::new("cancelled"))
            })
        }));
        let stage = stage("readiness", Duration::from_secs(600), true, action);

        let aborter = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            aborter.cancel("external abort request");
        });

        let exec = runner.run(&stage, &run_ctx()).await;
        assert_eq!(exec.outcome.status, StageStatus::Failure);
        assert_eq!(
            exec.outcome.error_detail.as_deref(),
            Some("external abort request")
        );
    }
}
