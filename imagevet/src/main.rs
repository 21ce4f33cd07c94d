//! Harness entry point: one pipeline run per configured tag.

use anyhow::Context as _;
use imagevet::collaborators::{ChromiumCapture, DockerCli, S3Store, SyftCli};
use imagevet::config::Config;
use imagevet::core::OverallStatus;
use imagevet::pipeline::Pipeline;
use imagevet::publish::{ArtifactPublisher, DryRunPublisher, RemotePublisher};
use imagevet::stages::Collaborators;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(Config::from_env().context("invalid environment")?);
    info!(
        image = %config.image,
        tags = config.tags.len(),
        dry_run = config.dry_run,
        "harness starting"
    );

    let collaborators = Collaborators {
        runtime: Arc::new(DockerCli::new()),
        screenshot: Arc::new(ChromiumCapture::new()),
        sbom: Arc::new(SyftCli::new()),
    };

    let mut worst = OverallStatus::Success;
    for tag in config.tags.clone() {
        let prefix = format!("{}/{}/{}", config.image, config.meta_tag, tag);
        let publisher: Arc<dyn ArtifactPublisher> = if config.dry_run {
            Arc::new(DryRunPublisher::new(config.dry_run_dir.clone(), prefix))
        } else {
            let storage = config
                .storage
                .clone()
                .context("remote publishing requires store credentials")?;
            Arc::new(RemotePublisher::new(Arc::new(S3Store::new(storage)), prefix))
        };

        let pipeline =
            Pipeline::from_config(config.clone(), &tag, collaborators.clone(), publisher)
                .context("could not build pipeline")?;
        let run = pipeline
            .run()
            .await
            .with_context(|| format!("pipeline for tag {tag} did not complete"))?;

        if run.report.overall_status.is_passing() {
            info!(%tag, status = %run.report.overall_status, "tag validated");
        } else {
            error!(%tag, status = %run.report.overall_status, "tag failed validation");
        }
        if let Some(warning) = run.publish_warning {
            warn!(%tag, objects = warning.failures.len(), "some artifacts were not published");
        }
        worst = worst.worst(run.report.overall_status);
    }

    if worst.is_passing() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
