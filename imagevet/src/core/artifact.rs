//! Captured artifacts and their serialized references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of artifact a stage produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Container log text.
    Log,
    /// A PNG screenshot of the running web interface.
    Screenshot,
    /// A software inventory document.
    Sbom,
    /// The rendered pipeline report itself.
    Report,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Screenshot => write!(f, "screenshot"),
            Self::Sbom => write!(f, "sbom"),
            Self::Report => write!(f, "report"),
        }
    }
}

/// A captured artifact: payload bytes plus metadata.
///
/// The payload never appears in the serialized report; outcomes record the
/// [`ArtifactRef`] view and the publisher carries the bytes to the store.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// File name of the artifact (also its key suffix in the store).
    pub name: String,
    /// What the artifact is.
    pub kind: ArtifactKind,
    /// MIME type used when uploading.
    pub media_type: String,
    /// The payload.
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Creates an artifact from raw bytes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ArtifactKind,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Creates a plain-text artifact.
    #[must_use]
    pub fn text(name: impl Into<String>, kind: ArtifactKind, content: impl Into<String>) -> Self {
        Self::new(name, kind, "text/plain", content.into().into_bytes())
    }

    /// Creates a PNG screenshot artifact.
    #[must_use]
    pub fn png(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(name, ArtifactKind::Screenshot, "image/png", bytes)
    }

    /// Returns the serializable reference for this artifact.
    #[must_use]
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            name: self.name.clone(),
            kind: self.kind,
            media_type: self.media_type.clone(),
            size_bytes: self.bytes.len() as u64,
        }
    }
}

/// The metadata view of an artifact, recorded on stage outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// File name of the artifact.
    pub name: String,
    /// What the artifact is.
    pub kind: ArtifactKind,
    /// MIME type.
    pub media_type: String,
    /// Payload size in bytes.
    pub size_bytes: u64,
}
