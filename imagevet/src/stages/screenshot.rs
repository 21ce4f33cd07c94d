//! Screenshot stage.

use super::{StageAction, StageContext};
use crate::core::Artifact;
use crate::errors::StageActionError;
use async_trait::async_trait;
use tracing::info;

/// Captures the container's web interface as a PNG artifact.
///
/// Only present in the stage list when screenshots are enabled; the pipeline
/// builder omits it otherwise, so a disabled screenshot never touches the
/// capture tool.
#[derive(Debug, Default)]
pub struct ScreenshotAction;

#[async_trait]
impl StageAction for ScreenshotAction {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageActionError> {
        let handle = ctx
            .run()
            .container()
            .ok_or_else(|| StageActionError::new("no running container"))?;
        let config = ctx.run().config();

        let address = ctx.run().runtime().address(&handle).await?;
        let proto = if config.tls { "https" } else { "http" };
        let url = format!("{proto}://{address}:{port}", port = config.port);

        info!(%url, delay = ?config.screenshot_delay, "capturing web interface");
        let png = ctx
            .run()
            .screenshot_tool()
            .capture(&url, config.screenshot_delay)
            .await?;

        ctx.attach_artifact(Artifact::png(format!("{}.png", ctx.run().tag()), png));
        Ok(())
    }
}
