//! Screenshot collaborator.

use crate::errors::StageActionError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Interface to the screenshot tool.
#[async_trait]
pub trait ScreenshotTool: Send + Sync {
    /// Waits `delay`, then captures `url` and returns PNG bytes.
    async fn capture(&self, url: &str, delay: Duration) -> Result<Vec<u8>, StageActionError>;
}

/// Real capture via a headless chromium binary.
///
/// Flags mirror the original harness's headless-Chrome setup: no sandbox, no
/// GPU, 1920x1080 window. Self-signed certificates are tolerated because the
/// container under test serves its own.
#[derive(Debug, Clone)]
pub struct ChromiumCapture {
    binary: String,
}

impl ChromiumCapture {
    /// Creates a capture tool using the `chromium` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "chromium".to_string(),
        }
    }

    /// Overrides the browser binary.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for ChromiumCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScreenshotTool for ChromiumCapture {
    async fn capture(&self, url: &str, delay: Duration) -> Result<Vec<u8>, StageActionError> {
        tokio::time::sleep(delay).await;

        let out_path = std::env::temp_dir().join(format!("imagevet-{}.png", Uuid::new_v4()));
        debug!(%url, out = %out_path.display(), "capturing screenshot");

        let output = Command::new(&self.binary)
            .arg("--headless")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--ignore-certificate-errors")
            .arg("--window-size=1920,1080")
            .arg(format!("--screenshot={}", out_path.display()))
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                StageActionError::new(format!("{} invocation failed: {err}", self.binary))
            })?;

        if !output.status.success() {
            return Err(StageActionError::new(format!(
                "screenshot of {url} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let bytes = tokio::fs::read(&out_path)
            .await
            .map_err(|err| StageActionError::new(format!("screenshot file unreadable: {err}")))?;
        let _ = tokio::fs::remove_file(&out_path).await;
        Ok(bytes)
    }
}
