//! Container lifecycle stages: launch, readiness wait, log capture.

use super::{StageAction, StageContext};
use crate::core::{Artifact, ArtifactKind};
use crate::errors::StageActionError;
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info};

/// Environment injected into the container under test, matching the
/// controlled configuration the original harness started images with.
pub const TEST_ENV: &[(&str, &str)] = &[("APP_URL", "_"), ("DB_CONNECTION", "sqlite_testing")];

const LOG_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Starts the container under test, detached, with the controlled test
/// environment. Registers teardown on the cancellation token so a launch
/// aborted mid-flight still stops what it started.
#[derive(Debug, Default)]
pub struct LaunchAction;

#[async_trait]
impl StageAction for LaunchAction {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageActionError> {
        let image = ctx.run().image_reference();
        let env: Vec<(String, String)> = TEST_ENV
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();

        let runtime = ctx.run().runtime();
        let handle = runtime.start(&image, &env).await?;
        info!(container = %handle.id, %image, "container started");

        let stop_handle = handle.clone();
        ctx.cancel().on_cancel("stop-container", move || {
            let runtime = runtime.clone();
            let handle = stop_handle.clone();
            tokio::spawn(async move {
                let _ = runtime.stop(&handle).await;
            });
        });

        ctx.run().set_container(handle);
        Ok(())
    }
}

/// Polls container logs until the readiness marker appears.
///
/// On cancellation (including the stage timeout) the partial log seen so far
/// is attached as an artifact before bailing, so a failed startup still
/// leaves diagnostics in the report.
#[derive(Debug)]
pub struct ReadinessAction {
    marker: Regex,
}

impl ReadinessAction {
    /// Creates the action with the configured marker pattern.
    pub fn new(pattern: &str) -> Result<Self, StageActionError> {
        let marker = Regex::new(pattern)
            .map_err(|err| StageActionError::new(format!("invalid readiness marker: {err}")))?;
        Ok(Self { marker })
    }
}

#[async_trait]
impl StageAction for ReadinessAction {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageActionError> {
        let handle = ctx
            .run()
            .container()
            .ok_or_else(|| StageActionError::new("no running container"))?;
        let runtime = ctx.run().runtime();

        let mut last_seen = String::new();
        loop {
            match runtime.logs(&handle).await {
                Ok(text) => {
                    if self.marker.is_match(&text) {
                        debug!(container = %handle.id, "readiness marker observed");
                        return Ok(());
                    }
                    last_seen = text;
                }
                Err(err) => {
                    attach_partial(ctx, &last_seen);
                    return Err(StageActionError::new(format!(
                        "could not read startup logs: {err}"
                    )));
                }
            }

            tokio::select! {
                () = tokio::time::sleep(LOG_POLL_INTERVAL) => {}
                () = ctx.cancel().cancelled() => {
                    attach_partial(ctx, &last_seen);
                    return Err(StageActionError::new("readiness marker never appeared"));
                }
            }
        }
    }
}

fn attach_partial(ctx: &StageContext, text: &str) {
    if !text.is_empty() {
        ctx.attach_artifact(Artifact::text("startup.log", ArtifactKind::Log, text));
    }
}

/// Captures the container's full log output as a text artifact.
#[derive(Debug, Default)]
pub struct LogCaptureAction;

#[async_trait]
impl StageAction for LogCaptureAction {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageActionError> {
        let handle = ctx
            .run()
            .container()
            .ok_or_else(|| StageActionError::new("no running container"))?;
        let text = ctx.run().runtime().logs(&handle).await?;
        ctx.attach_artifact(Artifact::text(
            format!("{}.log", ctx.run().tag()),
            ArtifactKind::Log,
            text,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::testing::{self, StubRuntime};
    use std::sync::Arc;

    fn stage_ctx(run: Arc<crate::stages::RunContext>, name: &str) -> StageContext {
        StageContext::new(run, name, CancellationToken::new())
    }

    #[tokio::test]
    async fn launch_records_container_handle() {
        let runtime = Arc::new(StubRuntime::ready_after(0));
        let run = Arc::new(testing::run_context_with_runtime("latest", runtime.clone()));
        let ctx = stage_ctx(run, "launch");

        LaunchAction.run(&ctx).await.unwrap();

        let handle = ctx.run().container().unwrap();
        assert_eq!(handle.image_reference, "linuxserver/heimdall:latest");
        assert_eq!(runtime.started(), vec!["linuxserver/heimdall:latest"]);
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let runtime = Arc::new(StubRuntime::failing_start());
        let run = Arc::new(testing::run_context_with_runtime("latest", runtime));
        let ctx = stage_ctx(run, "launch");

        let err = LaunchAction.run(&ctx).await.unwrap_err();
        assert!(err.message.contains("start"));
        assert!(ctx.run().container().is_none());
    }

    #[tokio::test]
    async fn readiness_without_container_fails() {
        let run = Arc::new(testing::run_context("latest"));
        let ctx = stage_ctx(run, "readiness");
        let action = ReadinessAction::new(crate::config::DEFAULT_READY_MARKER).unwrap();

        let err = action.run(&ctx).await.unwrap_err();
        assert_eq!(err.message, "no running container");
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_waits_for_marker() {
        let runtime = Arc::new(StubRuntime::ready_after(3));
        let run = Arc::new(testing::run_context_with_runtime("latest", runtime));
        let ctx = stage_ctx(run.clone(), "launch");
        LaunchAction.run(&ctx).await.unwrap();

        let ctx = stage_ctx(run, "readiness");
        let action = ReadinessAction::new(crate::config::DEFAULT_READY_MARKER).unwrap();
        action.run(&ctx).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_cancellation_attaches_partial_log() {
        let runtime = Arc::new(StubRuntime::never_ready());
        let run = Arc::new(testing::run_context_with_runtime("latest", runtime));
        let ctx = stage_ctx(run.clone(), "launch");
        LaunchAction.run(&ctx).await.unwrap();

        let ctx = stage_ctx(run, "readiness");
        let action = ReadinessAction::new(crate::config::DEFAULT_READY_MARKER).unwrap();

        let cancel = ctx.cancel().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            cancel.cancel("deadline elapsed");
        });

        let err = action.run(&ctx).await.unwrap_err();
        assert!(err.message.contains("never appeared"));

        let artifacts = ctx.take_artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "startup.log");
    }

    #[tokio::test]
    async fn log_capture_attaches_full_log() {
        let runtime = Arc::new(StubRuntime::ready_after(0));
        let run = Arc::new(testing::run_context_with_runtime("amd64-latest", runtime));
        let ctx = stage_ctx(run.clone(), "launch");
        LaunchAction.run(&ctx).await.unwrap();

        let ctx = stage_ctx(run, "logs");
        LogCaptureAction.run(&ctx).await.unwrap();

        let artifacts = ctx.take_artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "amd64-latest.log");
        assert_eq!(artifacts[0].kind, ArtifactKind::Log);
    }
}
