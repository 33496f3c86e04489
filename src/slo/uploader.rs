//! Segment uploader
//!
//! Reads one segment's byte range from the source file and PUTs it as its own
//! object, with the content hash sent along so the backend can verify it.
//!
//! Each worker owns a [`SegmentReader`] (its own file handle), so no read
//! position is ever shared between tasks.

use super::progress::ProgressState;
use super::segment::{Segment, SegmentStatus};
use crate::metrics;
use crate::store::{content_hash, ObjectStore, StoreError};
use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, instrument, warn};

/// Segment upload errors
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Failed to read source bytes {offset}..{end}: {source}")]
    Read {
        offset: u64,
        end: u64,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Local file being uploaded
#[derive(Debug, Clone)]
pub struct SegmentSource {
    path: PathBuf,
    size: u64,
}

impl SegmentSource {
    /// Stat `path`; it must be a readable regular file
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Fails early on missing or unreadable files
        let file = File::open(&path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Self {
            path,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open an independent read handle
    pub async fn reader(&self) -> std::io::Result<SegmentReader> {
        Ok(SegmentReader {
            file: File::open(&self.path).await?,
        })
    }
}

/// Positioned reader over the source file
#[derive(Debug)]
pub struct SegmentReader {
    file: File,
}

impl SegmentReader {
    /// Read exactly `length` bytes starting at `offset`
    pub async fn read(&mut self, offset: u64, length: u64) -> std::io::Result<Bytes> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = BytesMut::zeroed(length as usize);
        self.file.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// MD5 of the byte range, without keeping the bytes around
    pub async fn hash(&mut self, offset: u64, length: u64) -> std::io::Result<String> {
        let data = self.read(offset, length).await?;
        Ok(content_hash(&data))
    }
}

/// Uploads segments of one job into one container
#[derive(Clone)]
pub struct SegmentUploader {
    store: Arc<dyn ObjectStore>,
    container: String,
    progress: Arc<ProgressState>,
}

impl SegmentUploader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        container: impl Into<String>,
        progress: Arc<ProgressState>,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            progress,
        }
    }

    /// Upload one segment
    ///
    /// On success the segment is `Uploaded` with its hash set and its length
    /// credited to the progress counters. On failure it is `Failed` and
    /// nothing is credited.
    #[instrument(
        name = "slo.segment.upload",
        skip(self, segment, reader),
        fields(
            segment.index = segment.index(),
            segment.name = %segment.name(),
            segment.length = segment.length(),
        ),
        err
    )]
    pub async fn upload(
        &self,
        segment: &mut Segment,
        reader: &mut SegmentReader,
    ) -> Result<(), SegmentError> {
        segment.set_status(SegmentStatus::Uploading);
        let start = Instant::now();

        let result = self.send(segment, reader).await;
        match result {
            Ok(hash) => {
                segment.set_hash(Some(hash));
                segment.set_status(SegmentStatus::Uploaded);
                self.progress.record_uploaded(segment.length());
                metrics::record_segment_uploaded(segment.length(), start.elapsed().as_secs_f64());
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Segment uploaded");
                Ok(())
            }
            Err(e) => {
                segment.set_status(SegmentStatus::Failed);
                metrics::record_segment_failed();
                warn!(error = %e, "Segment upload failed");
                Err(e)
            }
        }
    }

    async fn send(
        &self,
        segment: &Segment,
        reader: &mut SegmentReader,
    ) -> Result<String, SegmentError> {
        let data = reader
            .read(segment.offset(), segment.length())
            .await
            .map_err(|source| SegmentError::Read {
                offset: segment.offset(),
                end: segment.end(),
                source,
            })?;

        let hash = content_hash(&data);
        let response = self
            .store
            .put_object(&self.container, segment.name(), data, Some(&hash), None)
            .await?;

        if let Some(etag) = response.etag {
            if !etag.eq_ignore_ascii_case(&hash) {
                return Err(StoreError::InvalidResponse(format!(
                    "ETag {} returned for {} does not match {}",
                    etag,
                    segment.name(),
                    hash
                ))
                .into());
            }
        }

        Ok(hash)
    }
}
