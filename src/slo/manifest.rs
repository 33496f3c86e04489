//! SLO manifest
//!
//! The manifest is a JSON array with one entry per segment, in sequence
//! order. Committing it is what makes the large object visible; until then
//! the segments are just ordinary objects.

use super::segment::Segment;
use crate::store::{ObjectStore, PutObjectResponse, StoreError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Manifest construction and commit errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Cannot build a manifest without segments")]
    Empty,

    #[error("Segment {index} ({name}) is {status}, not confirmed")]
    Unconfirmed {
        index: usize,
        name: String,
        status: super::segment::SegmentStatus,
    },

    #[error("Segment sequence is broken at position {position} (found index {index})")]
    OutOfOrder { position: usize, index: usize },

    #[error("Failed to encode manifest: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One segment reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// `/<container>/<segment name>`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Ordered list of segment references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build from the final segment set
    ///
    /// Every segment must be confirmed (uploaded or skipped) and the slice
    /// must hold indexes `0..n` in order.
    pub fn from_segments(container: &str, segments: &[Segment]) -> Result<Self, ManifestError> {
        if segments.is_empty() {
            return Err(ManifestError::Empty);
        }

        let entries = segments
            .iter()
            .enumerate()
            .map(|(position, segment)| {
                if segment.index() != position {
                    return Err(ManifestError::OutOfOrder {
                        position,
                        index: segment.index(),
                    });
                }
                if !segment.status().is_confirmed() {
                    return Err(ManifestError::Unconfirmed {
                        index: segment.index(),
                        name: segment.name().to_string(),
                        status: segment.status(),
                    });
                }
                Ok(ManifestEntry {
                    path: format!("/{}/{}", container, segment.name()),
                    etag: segment.hash().map(str::to_string),
                    size_bytes: segment.length(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Sum of all segment sizes
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec(&self.entries)?)
    }
}

/// Writes manifests to the backend
pub struct ManifestCommitter {
    store: Arc<dyn ObjectStore>,
}

impl ManifestCommitter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// PUT the manifest as `container/object_name`
    #[instrument(
        name = "slo.manifest.commit",
        skip(self, manifest),
        fields(segments = manifest.entries().len(), bytes = manifest.total_bytes()),
        err
    )]
    pub async fn commit(
        &self,
        container: &str,
        object_name: &str,
        manifest: &Manifest,
    ) -> Result<PutObjectResponse, ManifestError> {
        let body = Bytes::from(manifest.to_json()?);
        Ok(self.store.put_manifest(container, object_name, body).await?)
    }
}
