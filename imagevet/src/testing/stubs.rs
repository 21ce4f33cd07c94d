//! Stub collaborator implementations.

use crate::collaborators::{
    ContainerHandle, ContainerRuntime, ObjectStore, SbomGenerator, ScreenshotTool,
};
use crate::config::BaseDistro;
use crate::errors::{StageActionError, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// PNG magic bytes, enough for byte-identity assertions.
const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// A scripted container runtime.
///
/// Log output grows one boot line per poll; the readiness marker appears
/// after a configurable number of polls (or never).
#[derive(Debug)]
pub struct StubRuntime {
    ready_after_polls: Option<usize>,
    fail_start: bool,
    log_polls: Mutex<usize>,
    started: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
}

impl StubRuntime {
    /// Readiness marker appears once `polls` log reads have happened.
    #[must_use]
    pub fn ready_after(polls: usize) -> Self {
        Self {
            ready_after_polls: Some(polls),
            fail_start: false,
            log_polls: Mutex::new(0),
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
        }
    }

    /// The readiness marker never appears.
    #[must_use]
    pub fn never_ready() -> Self {
        Self {
            ready_after_polls: None,
            ..Self::ready_after(0)
        }
    }

    /// Every start attempt is refused.
    #[must_use]
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::ready_after(0)
        }
    }

    /// Image references passed to `start`, in order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    /// Container ids passed to `stop`, in order.
    #[must_use]
    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().clone()
    }
}

#[async_trait]
impl ContainerRuntime for StubRuntime {
    async fn start(
        &self,
        image: &str,
        _env: &[(String, String)],
    ) -> Result<ContainerHandle, StageActionError> {
        if self.fail_start {
            return Err(StageActionError::new("stub refused to start container"));
        }
        self.started.lock().push(image.to_string());
        Ok(ContainerHandle {
            id: format!("stub-{}", self.started.lock().len()),
            image_reference: image.to_string(),
        })
    }

    async fn logs(&self, _handle: &ContainerHandle) -> Result<String, StageActionError> {
        let polls = {
            let mut polls = self.log_polls.lock();
            *polls += 1;
            *polls
        };
        let mut text = String::from("[init] starting services\n");
        for line in 0..polls {
            text.push_str(&format!("[services.d] starting service {line}\n"));
        }
        if self.ready_after_polls.is_some_and(|after| polls > after) {
            text.push_str("[services.d] done.\n");
        }
        Ok(text)
    }

    async fn address(&self, _handle: &ContainerHandle) -> Result<String, StageActionError> {
        Ok("172.17.0.2".to_string())
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), StageActionError> {
        self.stopped.lock().push(handle.id.clone());
        Ok(())
    }
}

/// A canned screenshot tool.
#[derive(Debug)]
pub struct StubScreenshot {
    fail: bool,
    captured: Mutex<Vec<String>>,
}

impl StubScreenshot {
    /// Returns a fixed PNG for every capture.
    #[must_use]
    pub fn succeeding() -> Self {
        Self {
            fail: false,
            captured: Mutex::new(Vec::new()),
        }
    }

    /// Refuses every capture.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            captured: Mutex::new(Vec::new()),
        }
    }

    /// URLs passed to `capture`, in order.
    #[must_use]
    pub fn captured_urls(&self) -> Vec<String> {
        self.captured.lock().clone()
    }
}

#[async_trait]
impl ScreenshotTool for StubScreenshot {
    async fn capture(&self, url: &str, delay: Duration) -> Result<Vec<u8>, StageActionError> {
        tokio::time::sleep(delay).await;
        if self.fail {
            return Err(StageActionError::new(format!("stub refused to capture {url}")));
        }
        self.captured.lock().push(url.to_string());
        Ok(PNG_STUB.to_vec())
    }
}

/// A canned software-inventory generator.
#[derive(Debug)]
pub struct StubSbom {
    document: String,
    fail: bool,
}

impl StubSbom {
    /// Returns `document` for every image.
    #[must_use]
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            fail: false,
        }
    }

    /// Refuses every generation request.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            document: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SbomGenerator for StubSbom {
    async fn generate(
        &self,
        image: &str,
        _base: BaseDistro,
    ) -> Result<String, StageActionError> {
        if self.fail {
            return Err(StageActionError::new(format!(
                "stub refused inventory scan of {image}"
            )));
        }
        Ok(self.document.clone())
    }
}

/// An in-memory object store with per-key failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    attempts: Mutex<HashMap<String, u32>>,
    fail_remaining: Mutex<HashMap<String, u32>>,
    fail_always: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` puts of `key` fail.
    pub fn fail_next(&self, key: &str, times: u32) {
        self.fail_remaining.lock().insert(key.to_string(), times);
    }

    /// Makes every put of `key` fail.
    pub fn fail_always(&self, key: &str) {
        self.fail_always.lock().insert(key.to_string());
    }

    /// Returns all stored keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Returns the stored bytes for `key`.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }

    /// Returns how many puts were attempted for `key`.
    #[must_use]
    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: &[u8], _media_type: &str) -> Result<(), StoreError> {
        *self.attempts.lock().entry(key.to_string()).or_insert(0) += 1;

        if self.fail_always.lock().contains(key) {
            return Err(StoreError::new(format!("injected failure for {key}")));
        }
        if let Some(remaining) = self.fail_remaining.lock().get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::new(format!("injected failure for {key}")));
            }
        }

        self.objects.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
