//! Artifact publishing.
//!
//! Both publishers build the exact same payload set from a report and its
//! artifacts; only the destination differs. That makes dry-run output a
//! faithful stand-in for remote publishing in tests.

use crate::core::Artifact;
use crate::errors::{PublishError, PublishFailure};
use crate::report::PipelineReport;
use crate::collaborators::ObjectStore;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PUT_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// One object to publish.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Key relative to the publisher's prefix.
    pub name: String,
    /// MIME type.
    pub media_type: String,
    /// The object bytes.
    pub bytes: Vec<u8>,
}

/// Builds the full payload set for a run: the JSON report, the Markdown
/// rendering, and every captured artifact, in that order.
pub fn payloads(
    report: &PipelineReport,
    artifacts: &[Artifact],
) -> Result<Vec<Payload>, PublishError> {
    let json = report.to_json_bytes().map_err(|err| {
        PublishError::new(vec![PublishFailure {
            object: "report.json".to_string(),
            attempts: 0,
            reason: format!("report serialization failed: {err}"),
        }])
    })?;

    let mut out = vec![
        Payload {
            name: "report.json".to_string(),
            media_type: "application/json".to_string(),
            bytes: json,
        },
        Payload {
            name: "report.md".to_string(),
            media_type: "text/markdown".to_string(),
            bytes: report.render_markdown().into_bytes(),
        },
    ];
    out.extend(artifacts.iter().map(|artifact| Payload {
        name: artifact.name.clone(),
        media_type: artifact.media_type.clone(),
        bytes: artifact.bytes.clone(),
    }));
    Ok(out)
}

/// Persists a finalized report and its artifacts.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Publishes every payload. Individual failures are collected into a
    /// [`PublishError`]; the report's verdict is never affected.
    async fn publish(
        &self,
        report: &PipelineReport,
        artifacts: &[Artifact],
    ) -> Result<(), PublishError>;
}

/// Publishes to the durable object store, retrying each object a bounded
/// number of times.
pub struct RemotePublisher {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl RemotePublisher {
    /// Creates a publisher writing under `prefix` in the store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ArtifactPublisher for RemotePublisher {
    async fn publish(
        &self,
        report: &PipelineReport,
        artifacts: &[Artifact],
    ) -> Result<(), PublishError> {
        let mut failures = Vec::new();

        for payload in payloads(report, artifacts)? {
            let key = format!("{}/{}", self.prefix, payload.name);
            let mut last_error = String::new();
            let mut published = false;

            for attempt in 1..=PUT_ATTEMPTS {
                match self
                    .store
                    .put(&key, &payload.bytes, &payload.media_type)
                    .await
                {
                    Ok(()) => {
                        info!(%key, attempt, "object published");
                        published = true;
                        break;
                    }
                    Err(err) => {
                        warn!(%key, attempt, error = %err, "object upload failed");
                        last_error = err.to_string();
                        if attempt < PUT_ATTEMPTS {
                            tokio::time::sleep(RETRY_BACKOFF).await;
                        }
                    }
                }
            }

            if !published {
                failures.push(PublishFailure {
                    object: key,
                    attempts: PUT_ATTEMPTS,
                    reason: last_error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError::new(failures))
        }
    }
}

/// Publishes to a local directory instead of the remote store.
///
/// Behaviorally identical to [`RemotePublisher`] apart from the destination:
/// the payload set, keys, and bytes are the same.
pub struct DryRunPublisher {
    root: PathBuf,
    prefix: String,
}

impl DryRunPublisher {
    /// Creates a publisher writing under `root/prefix`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ArtifactPublisher for DryRunPublisher {
    async fn publish(
        &self,
        report: &PipelineReport,
        artifacts: &[Artifact],
    ) -> Result<(), PublishError> {
        let dir = self.root.join(&self.prefix);
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            return Err(PublishError::new(vec![PublishFailure {
                object: dir.display().to_string(),
                attempts: 1,
                reason: format!("could not create output directory: {err}"),
            }]));
        }

        let mut failures = Vec::new();
        for payload in payloads(report, artifacts)? {
            let path = dir.join(&payload.name);
            match tokio::fs::write(&path, &payload.bytes).await {
                Ok(()) => info!(path = %path.display(), "object written"),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "object write failed");
                    failures.push(PublishFailure {
                        object: path.display().to_string(),
                        attempts: 1,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError::new(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtifactKind, StageOutcome};
    use crate::report::ReportAggregator;
    use crate::testing::MemoryStore;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn report() -> PipelineReport {
        let mut agg = ReportAggregator::new(
            "linuxserver/heimdall:latest",
            vec!["latest".to_string()],
            1,
        );
        let now = Utc::now();
        agg.record(StageOutcome::success("launch", true, now, now, Vec::new()));
        agg.finalize().unwrap()
    }

    fn sample_artifacts() -> Vec<Artifact> {
        vec![
            Artifact::text("latest.log", ArtifactKind::Log, "[services.d] done."),
            Artifact::png("latest.png", vec![1, 2, 3]),
        ]
    }

    #[test]
    fn payload_set_is_report_then_artifacts() {
        let payloads = payloads(&report(), &sample_artifacts()).unwrap();
        let names: Vec<&str> = payloads.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["report.json", "report.md", "latest.log", "latest.png"]);
    }

    #[tokio::test]
    async fn remote_publisher_uploads_under_prefix() {
        let store = Arc::new(MemoryStore::new());
        let publisher = RemotePublisher::new(store.clone(), "heimdall/2.4.13/latest");

        publisher
            .publish(&report(), &sample_artifacts())
            .await
            .unwrap();

        let keys = store.keys();
        assert!(keys.contains(&"heimdall/2.4.13/latest/report.json".to_string()));
        assert!(keys.contains(&"heimdall/2.4.13/latest/latest.png".to_string()));
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_store_failure_is_retried() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next("ci/report.json", 2);
        let publisher = RemotePublisher::new(store.clone(), "ci");

        publisher.publish(&report(), &[]).await.unwrap();

        assert!(store.keys().contains(&"ci/report.json".to_string()));
        assert_eq!(store.attempts("ci/report.json"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_store_failure_becomes_warning() {
        let store = Arc::new(MemoryStore::new());
        store.fail_always("ci/latest.log");
        let publisher = RemotePublisher::new(store.clone(), "ci");

        let err = publisher
            .publish(&report(), &sample_artifacts())
            .await
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].object, "ci/latest.log");
        assert_eq!(err.failures[0].attempts, 3);
        // Other objects were still published.
        assert!(store.keys().contains(&"ci/report.json".to_string()));
        assert!(store.keys().contains(&"ci/latest.png".to_string()));
    }

    #[tokio::test]
    async fn dry_run_writes_identical_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let report = report();
        let artifacts = sample_artifacts();

        RemotePublisher::new(store.clone(), "ci")
            .publish(&report, &artifacts)
            .await
            .unwrap();
        DryRunPublisher::new(tmp.path(), "ci")
            .publish(&report, &artifacts)
            .await
            .unwrap();

        for name in ["report.json", "report.md", "latest.log", "latest.png"] {
            let remote = store.object(&format!("ci/{name}")).unwrap();
            let local = std::fs::read(tmp.path().join("ci").join(name)).unwrap();
            assert_eq!(remote, local, "payload mismatch for {name}");
        }
    }
}
