//! Software-inventory collaborator.

use crate::config::BaseDistro;
use crate::errors::StageActionError;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Interface to the software-inventory generator.
#[async_trait]
pub trait SbomGenerator: Send + Sync {
    /// Produces a package inventory document for `image`.
    async fn generate(
        &self,
        image: &str,
        base: BaseDistro,
    ) -> Result<String, StageActionError>;
}

/// Real inventory via the `syft` CLI.
///
/// The base-distro hint selects the cataloger scope; syft detects the
/// package database itself, so the hint is informational only.
#[derive(Debug, Clone)]
pub struct SyftCli {
    binary: String,
}

impl SyftCli {
    /// Creates a generator using the `syft` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "syft".to_string(),
        }
    }
}

impl Default for SyftCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SbomGenerator for SyftCli {
    async fn generate(
        &self,
        image: &str,
        base: BaseDistro,
    ) -> Result<String, StageActionError> {
        debug!(%image, ?base, "generating software inventory");
        let output = Command::new(&self.binary)
            .arg(image)
            .args(["-o", "table"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                StageActionError::new(format!("{} invocation failed: {err}", self.binary))
            })?;

        if !output.status.success() {
            return Err(StageActionError::new(format!(
                "inventory scan of {image} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
