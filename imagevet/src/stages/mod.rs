//! Stage definitions and execution context.
//!
//! Stages are the units of pipeline work. Each has a name, a timeout, a
//! required flag, and an action. Actions are opaque to the pipeline: they
//! receive a [`StageContext`] (shared run state, a cancellation token, an
//! artifact sink) and either succeed or return a [`StageActionError`].

mod container;
mod screenshot;
mod sbom;

pub use container::{LaunchAction, LogCaptureAction, ReadinessAction, TEST_ENV};
pub use screenshot::ScreenshotAction;
pub use sbom::SbomAction;

use crate::cancellation::CancellationToken;
use crate::collaborators::{ContainerHandle, ContainerRuntime, SbomGenerator, ScreenshotTool};
use crate::config::Config;
use crate::core::Artifact;
use crate::errors::StageActionError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// The collaborator set a run executes against.
#[derive(Clone)]
pub struct Collaborators {
    /// The container runtime.
    pub runtime: Arc<dyn ContainerRuntime>,
    /// The screenshot tool.
    pub screenshot: Arc<dyn ScreenshotTool>,
    /// The software-inventory generator.
    pub sbom: Arc<dyn SbomGenerator>,
}

/// State shared across one pipeline run.
///
/// The only cross-stage mutable slot is the container handle: the launch
/// stage writes it once, later stages read it. Everything else is immutable.
pub struct RunContext {
    config: Arc<Config>,
    tag: String,
    collaborators: Collaborators,
    container: RwLock<Option<ContainerHandle>>,
}

impl RunContext {
    /// Creates the run context for one `image:tag`.
    #[must_use]
    pub fn new(config: Arc<Config>, tag: impl Into<String>, collaborators: Collaborators) -> Self {
        Self {
            config,
            tag: tag.into(),
            collaborators,
            container: RwLock::new(None),
        }
    }

    /// Returns the harness configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the tag under test.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the full `image:tag` reference under test.
    #[must_use]
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.config.image, self.tag)
    }

    /// Returns the container runtime.
    #[must_use]
    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        self.collaborators.runtime.clone()
    }

    /// Returns the screenshot tool.
    #[must_use]
    pub fn screenshot_tool(&self) -> Arc<dyn ScreenshotTool> {
        self.collaborators.screenshot.clone()
    }

    /// Returns the software-inventory generator.
    #[must_use]
    pub fn sbom_generator(&self) -> Arc<dyn SbomGenerator> {
        self.collaborators.sbom.clone()
    }

    /// Records the started container. Written once by the launch stage.
    pub fn set_container(&self, handle: ContainerHandle) {
        *self.container.write() = Some(handle);
    }

    /// Returns the running container's handle, if one was started.
    #[must_use]
    pub fn container(&self) -> Option<ContainerHandle> {
        self.container.read().clone()
    }
}

/// Per-stage execution context handed to actions.
///
/// Artifacts are attached through the context rather than returned, so
/// whatever was produced before a failure or timeout still reaches the
/// outcome.
pub struct StageContext {
    run: Arc<RunContext>,
    stage_name: String,
    cancel: CancellationToken,
    artifacts: Mutex<Vec<Artifact>>,
}

impl StageContext {
    /// Creates a stage context.
    #[must_use]
    pub fn new(run: Arc<RunContext>, stage_name: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            run,
            stage_name: stage_name.into(),
            cancel,
            artifacts: Mutex::new(Vec::new()),
        }
    }

    /// Returns the shared run state.
    #[must_use]
    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// Returns the stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the stage's cancellation token.
    #[must_use]
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Attaches an artifact to the stage's outcome, preserving order.
    pub fn attach_artifact(&self, artifact: Artifact) {
        self.artifacts.lock().push(artifact);
    }

    /// Drains the attached artifacts. Called by the runner after the action
    /// settles (or its grace period elapses).
    #[must_use]
    pub fn take_artifacts(&self) -> Vec<Artifact> {
        std::mem::take(&mut *self.artifacts.lock())
    }
}

/// Trait for stage actions.
#[async_trait]
pub trait StageAction: Send + Sync + Debug {
    /// Executes the action.
    ///
    /// Actions must honor `ctx.cancel()` at their suspension points and
    /// release any external resource they started before returning from the
    /// cancellation path.
    async fn run(&self, ctx: &StageContext) -> Result<(), StageActionError>;
}

/// One named unit of pipeline work.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// Unique name within the pipeline.
    pub name: String,
    /// Duration after which the stage is forcibly aborted.
    pub timeout: Duration,
    /// Whether a halting outcome stops the pipeline.
    pub required: bool,
    /// The unit of work.
    pub action: Arc<dyn StageAction>,
}

impl StageDefinition {
    /// Creates a stage definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        timeout: Duration,
        required: bool,
        action: Arc<dyn StageAction>,
    ) -> Self {
        Self {
            name: name.into(),
            timeout,
            required,
            action,
        }
    }
}

/// A closure-based stage action, mainly for tests.
pub struct FnAction<F>
where
    F: for<'a> Fn(&'a StageContext) -> BoxFuture<'a, Result<(), StageActionError>> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnAction<F>
where
    F: for<'a> Fn(&'a StageContext) -> BoxFuture<'a, Result<(), StageActionError>> + Send + Sync,
{
    /// Creates a closure-based action.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnAction<F>
where
    F: for<'a> Fn(&'a StageContext) -> BoxFuture<'a, Result<(), StageActionError>> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> StageAction for FnAction<F>
where
    F: for<'a> Fn(&'a StageContext) -> BoxFuture<'a, Result<(), StageActionError>> + Send + Sync,
{
    async fn run(&self, ctx: &StageContext) -> Result<(), StageActionError> {
        (self.func)(ctx).await
    }
}
