//! Static Large Object upload engine
//!
//! Splits a local file into segments, uploads them in parallel and commits
//! an SLO manifest that stitches them into one object:
//!
//! ```text
//! planner -> prober -> coordinator -> uploader workers -> manifest committer
//!                           |
//!                           +-> progress aggregator <- poller -> reporter
//! ```
//!
//! # Example
//!
//! ```no_run
//! use large_objects::slo::{SegmentSource, UploadCoordinator, UploadJob};
//! use large_objects::store::{SwiftClient, SwiftClientConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SwiftClient::new(SwiftClientConfig {
//!     storage_url: "https://swift.example.com/v1/AUTH_abc".into(),
//!     auth_token: "token".into(),
//!     timeout: None,
//! })?;
//!
//! let source = SegmentSource::open("disk.img").await?;
//! let job = UploadJob::new(source, "backups", "disk.img").with_resume(true);
//! let report = UploadCoordinator::new(Arc::new(store), job).run().await?;
//! println!("{} segments", report.segments_total);
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod job;
pub mod manifest;
pub mod planner;
pub mod prober;
pub mod progress;
pub mod segment;
pub mod uploader;

pub use coordinator::{JobState, UploadCoordinator, UploadReport};
pub use job::{JobLog, ResumeCheck, UploadJob};
pub use manifest::{Manifest, ManifestCommitter, ManifestEntry, ManifestError};
pub use planner::{plan, ChunkSize, Plan, PlanError};
pub use prober::{probe, ProbeSummary};
pub use progress::{LogReporter, ProgressPoller, ProgressReporter, ProgressSnapshot, ProgressState};
pub use segment::{Segment, SegmentStatus};
pub use uploader::{SegmentError, SegmentReader, SegmentSource, SegmentUploader};

use crate::store::StoreError;
use thiserror::Error;

/// Terminal error of an upload job, tagged with the phase it happened in
#[derive(Error, Debug)]
pub enum SloError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanError),

    #[error("Probing failed: cannot list existing segments: {0}")]
    Probing(#[source] StoreError),

    #[error("Probing failed: cannot verify existing segments: {0}")]
    Verify(#[source] std::io::Error),

    #[error("Segment {index} ({name}) failed: {source}")]
    Segment {
        index: usize,
        name: String,
        #[source]
        source: SegmentError,
    },

    #[error("Upload worker failed: {0}")]
    Worker(String),

    #[error("Only {confirmed} of {expected} segments are confirmed")]
    Incomplete { confirmed: usize, expected: usize },

    #[error("Manifest commit failed: {0}")]
    Commit(#[from] ManifestError),
}

impl SloError {
    /// Coordinator phase the error belongs to
    pub fn phase(&self) -> JobState {
        match self {
            SloError::Planning(_) => JobState::Planning,
            SloError::Probing(_) | SloError::Verify(_) => JobState::Probing,
            SloError::Segment { .. } | SloError::Worker(_) => JobState::Awaiting,
            SloError::Incomplete { .. } | SloError::Commit(_) => JobState::Committing,
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            SloError::Planning(_) => "planning",
            SloError::Probing(_) | SloError::Verify(_) => "probing",
            SloError::Segment { .. } => "segment",
            SloError::Worker(_) => "worker",
            SloError::Incomplete { .. } => "incomplete",
            SloError::Commit(_) => "commit",
        }
    }
}
