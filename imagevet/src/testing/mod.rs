//! Deterministic stubs and fixtures.
//!
//! Everything here is deliberately free of real infrastructure: scripted
//! log phases, canned screenshots, an in-memory store with failure
//! injection. The whole pipeline can run hermetically against these, which
//! is what the integration tests rely on.

mod stubs;

pub use stubs::{MemoryStore, StubRuntime, StubSbom, StubScreenshot};

use crate::config::{BaseDistro, Config};
use crate::stages::{Collaborators, RunContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A fixture configuration with short timeouts and dry-run publishing.
#[must_use]
pub fn test_config() -> Config {
    Config {
        image: "linuxserver/heimdall".to_string(),
        tags: vec!["latest".to_string()],
        meta_tag: "2.4.13".to_string(),
        port: 443,
        tls: true,
        base: BaseDistro::Alpine,
        ready_marker: crate::config::DEFAULT_READY_MARKER.to_string(),
        launch_timeout: Duration::from_secs(30),
        readiness_timeout: Duration::from_secs(120),
        logs_timeout: Duration::from_secs(30),
        screenshot_enabled: true,
        screenshot_delay: Duration::from_secs(1),
        screenshot_timeout: Duration::from_secs(30),
        sbom_timeout: Duration::from_secs(60),
        dry_run: true,
        dry_run_dir: PathBuf::from("output"),
        storage: None,
    }
}

/// The default all-green stub collaborator set.
#[must_use]
pub fn stub_collaborators() -> Collaborators {
    Collaborators {
        runtime: Arc::new(StubRuntime::ready_after(0)),
        screenshot: Arc::new(StubScreenshot::succeeding()),
        sbom: Arc::new(StubSbom::with_document("busybox-1.36.1-r5")),
    }
}

/// A run context over the default stubs.
#[must_use]
pub fn run_context(tag: &str) -> RunContext {
    RunContext::new(Arc::new(test_config()), tag, stub_collaborators())
}

/// A run context with a specific runtime stub.
#[must_use]
pub fn run_context_with_runtime(tag: &str, runtime: Arc<StubRuntime>) -> RunContext {
    let mut collaborators = stub_collaborators();
    collaborators.runtime = runtime;
    RunContext::new(Arc::new(test_config()), tag, collaborators)
}

/// A run context with specific runtime and screenshot stubs.
#[must_use]
pub fn run_context_with(
    tag: &str,
    runtime: Arc<StubRuntime>,
    screenshot: Arc<StubScreenshot>,
) -> RunContext {
    let mut collaborators = stub_collaborators();
    collaborators.runtime = runtime;
    collaborators.screenshot = screenshot;
    RunContext::new(Arc::new(test_config()), tag, collaborators)
}

/// A run context with a specific inventory stub.
#[must_use]
pub fn run_context_with_sbom(tag: &str, sbom: Arc<StubSbom>) -> RunContext {
    let mut collaborators = stub_collaborators();
    collaborators.sbom = sbom;
    RunContext::new(Arc::new(test_config()), tag, collaborators)
}
