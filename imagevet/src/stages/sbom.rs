//! Software-inventory stage.

use super::{StageAction, StageContext};
use crate::core::{Artifact, ArtifactKind};
use crate::errors::StageActionError;
use async_trait::async_trait;
use tracing::info;

/// Generates the package inventory for the image under test.
#[derive(Debug, Default)]
pub struct SbomAction;

#[async_trait]
impl StageAction for SbomAction {
    async fn run(&self, ctx: &StageContext) -> Result<(), StageActionError> {
        let image = ctx.run().image_reference();
        let base = ctx.run().config().base;

        info!(%image, "generating software inventory");
        let document = ctx.run().sbom_generator().generate(&image, base).await?;

        ctx.attach_artifact(Artifact::text(
            format!("{}.packages.txt", ctx.run().tag()),
            ArtifactKind::Sbom,
            document,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::testing::{self, StubSbom};
    use std::sync::Arc;

    #[tokio::test]
    async fn inventory_attaches_document() {
        let run = Arc::new(testing::run_context_with_sbom(
            "latest",
            Arc::new(StubSbom::with_document("busybox-1.36.1-r5")),
        ));
        let ctx = StageContext::new(run, "sbom", CancellationToken::new());

        SbomAction.run(&ctx).await.unwrap();

        let artifacts = ctx.take_artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "latest.packages.txt");
        assert_eq!(artifacts[0].bytes, b"busybox-1.36.1-r5");
    }

    #[tokio::test]
    async fn generator_failure_is_reported() {
        let run = Arc::new(testing::run_context_with_sbom(
            "latest",
            Arc::new(StubSbom::failing()),
        ));
        let ctx = StageContext::new(run, "sbom", CancellationToken::new());

        let err = SbomAction.run(&ctx).await.unwrap_err();
        assert!(err.message.contains("inventory"));
    }
}
