//! # imagevet
//!
//! A validation harness for container images. Each tag of an image is run
//! through a fixed pipeline of checks:
//!
//! - **Launch**: start the container with a controlled test environment
//! - **Readiness**: poll logs until the init system reports done
//! - **Log capture**: preserve full startup output as an artifact
//! - **Screenshot**: render the web interface headlessly (optional)
//! - **Software inventory**: record the installed package set (optional)
//!
//! Every stage runs under its own timeout; required stages halt the run on
//! failure, optional stages only degrade the verdict. The finalized report
//! and all artifacts are published to an S3-compatible store, or to a local
//! directory in dry-run mode.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use imagevet::prelude::*;
//!
//! let config = Arc::new(Config::from_env()?);
//! let pipeline = Pipeline::from_config(config, "latest", collaborators, publisher)?;
//! let run = pipeline.run().await?;
//! assert!(run.report.overall_status.is_passing());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod collaborators;
pub mod config;
pub mod core;
pub mod errors;
pub mod pipeline;
pub mod publish;
pub mod report;
pub mod runner;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::collaborators::{
        ChromiumCapture, ContainerHandle, ContainerRuntime, DockerCli, ObjectStore, S3Store,
        SbomGenerator, ScreenshotTool, SyftCli,
    };
    pub use crate::config::{BaseDistro, Config, StorageConfig};
    pub use crate::core::{
        Artifact, ArtifactKind, ArtifactRef, OverallStatus, StageOutcome, StageStatus,
    };
    pub use crate::errors::{
        ConfigError, HarnessError, PublishError, StageActionError, StoreError,
    };
    pub use crate::pipeline::{Pipeline, PipelineRun};
    pub use crate::publish::{ArtifactPublisher, DryRunPublisher, RemotePublisher};
    pub use crate::report::{PipelineReport, ReportAggregator};
    pub use crate::runner::{StageExecution, StageRunner};
    pub use crate::stages::{Collaborators, RunContext, StageAction, StageContext, StageDefinition};
}
