//! Container runtime collaborator.

use crate::errors::StageActionError;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// A handle to a started container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// The runtime's container id.
    pub id: String,
    /// The image reference the container was started from.
    pub image_reference: String,
}

/// Interface to the container runtime.
///
/// `stop` must be safe to call multiple times and after a timeout; every
/// other operation may fail freely and is reported as stage-action data.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Starts a detached container and returns its handle.
    async fn start(
        &self,
        image: &str,
        env: &[(String, String)],
    ) -> Result<ContainerHandle, StageActionError>;

    /// Returns the container's log output captured so far.
    async fn logs(&self, handle: &ContainerHandle) -> Result<String, StageActionError>;

    /// Returns the container's bridge-network address.
    async fn address(&self, handle: &ContainerHandle) -> Result<String, StageActionError>;

    /// Forcibly removes the container. Idempotent.
    async fn stop(&self, handle: &ContainerHandle) -> Result<(), StageActionError>;
}

/// Real runtime driving the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Creates a runtime using the `docker` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Overrides the binary, e.g. for `podman`.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, StageActionError> {
        debug!(binary = %self.binary, ?args, "invoking container runtime");
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| StageActionError::new(format!("{} invocation failed: {err}", self.binary)))
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String, StageActionError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageActionError::new(format!(
                "{} {} exited with {}: {}",
                self.binary,
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start(
        &self,
        image: &str,
        env: &[(String, String)],
    ) -> Result<ContainerHandle, StageActionError> {
        let env_flags: Vec<String> = env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut args = vec!["run", "-d"];
        for flag in &env_flags {
            args.push("-e");
            args.push(flag);
        }
        args.push(image);

        let id = self.run_checked(&args).await?;
        Ok(ContainerHandle {
            id,
            image_reference: image.to_string(),
        })
    }

    async fn logs(&self, handle: &ContainerHandle) -> Result<String, StageActionError> {
        // `docker logs` writes the container's stderr stream to our stderr;
        // both streams belong in the captured log.
        let output = self.run(&["logs", &handle.id]).await?;
        if !output.status.success() {
            return Err(StageActionError::new(format!(
                "could not read logs for {}: {}",
                handle.id,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn address(&self, handle: &ContainerHandle) -> Result<String, StageActionError> {
        let ip = self
            .run_checked(&[
                "inspect",
                "-f",
                "{{.NetworkSettings.Networks.bridge.IPAddress}}",
                &handle.id,
            ])
            .await?;
        if ip.is_empty() {
            return Err(StageActionError::new(format!(
                "container {} has no bridge address",
                handle.id
            )));
        }
        Ok(ip)
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), StageActionError> {
        let output = self.run(&["rm", "-f", &handle.id]).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // Already gone counts as stopped.
        if stderr.contains("No such container") {
            return Ok(());
        }
        Err(StageActionError::new(format!(
            "could not remove container {}: {}",
            handle.id,
            stderr.trim()
        )))
    }
}
