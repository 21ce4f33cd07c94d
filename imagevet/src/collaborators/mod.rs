//! External-tool collaborators.
//!
//! The pipeline core never invokes docker, a browser, an SBOM scanner, or
//! the object store directly; it goes through the narrow traits here. Each
//! trait has one real implementation (shelling out to the external tool or
//! speaking HTTP) and a deterministic stub in [`crate::testing`].

mod capture;
mod runtime;
mod sbom;
mod store;

pub use capture::{ChromiumCapture, ScreenshotTool};
pub use runtime::{ContainerHandle, ContainerRuntime, DockerCli};
pub use sbom::{SbomGenerator, SyftCli};
pub use store::{ObjectStore, S3Store};
