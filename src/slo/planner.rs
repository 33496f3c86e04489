//! Segment planner
//!
//! Splits a file of known size into contiguous, non-overlapping segments.
//! Pure and deterministic: the same inputs always produce the same plan, which
//! is what makes resumed uploads line up with segments from earlier runs.

use super::segment::{index_width, segment_name, Segment};
use thiserror::Error;

/// Number of segments the automatic chunk size aims for
pub const DEFAULT_SEGMENT_TARGET: u64 = 1000;

/// Smallest chunk size picked automatically (1 MiB)
///
/// Files under roughly 1000 MiB therefore get fewer than
/// [`DEFAULT_SEGMENT_TARGET`] segments with `Auto` (a 10 MB file becomes 10
/// segments). Ask for `ChunkSize::Count(1000)` (`-n 1000`) to split them finer.
pub const MIN_AUTO_CHUNK_SIZE: u64 = 1024 * 1024;

/// Planning errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Source file is empty")]
    EmptyFile,

    #[error("Plan has {segments} segments, more than the allowed {max}")]
    TooManySegments { segments: usize, max: usize },
}

/// Requested chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkSize {
    /// Aim for [`DEFAULT_SEGMENT_TARGET`] segments, never below [`MIN_AUTO_CHUNK_SIZE`]
    #[default]
    Auto,
    /// Fixed chunk size in bytes (0 behaves like `Auto`)
    Bytes(u64),
    /// Aim for this many segments (0 behaves like `Auto`)
    Count(u64),
}

impl ChunkSize {
    /// Build from a signed byte count, where any value <= 0 means `Auto`
    pub fn from_requested_bytes(requested: i64) -> Self {
        if requested <= 0 {
            ChunkSize::Auto
        } else {
            ChunkSize::Bytes(requested as u64)
        }
    }

    /// Effective chunk size for a file of `file_size` bytes (`file_size` > 0)
    pub fn resolve(self, file_size: u64) -> u64 {
        let chunk = match self {
            ChunkSize::Auto | ChunkSize::Bytes(0) | ChunkSize::Count(0) => {
                file_size.div_ceil(DEFAULT_SEGMENT_TARGET).max(MIN_AUTO_CHUNK_SIZE)
            }
            ChunkSize::Bytes(bytes) => bytes,
            ChunkSize::Count(count) => file_size.div_ceil(count),
        };
        chunk.clamp(1, file_size)
    }
}

/// Result of planning
#[derive(Debug, Clone)]
pub struct Plan {
    pub chunk_size: u64,
    pub segments: Vec<Segment>,
}

impl Plan {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Plan the segments for `object_name` over a file of `file_size` bytes
///
/// # Example
///
/// ```
/// use large_objects::slo::planner::{plan, ChunkSize};
///
/// let plan = plan("backup.tar", 2_500, ChunkSize::Bytes(1_000)).unwrap();
/// assert_eq!(plan.segments.len(), 3);
/// assert_eq!(plan.segments[2].length(), 500);
/// assert_eq!(plan.segments[2].name(), "backup.tar-chunk-0002");
/// ```
pub fn plan(object_name: &str, file_size: u64, chunk_size: ChunkSize) -> Result<Plan, PlanError> {
    if file_size == 0 {
        return Err(PlanError::EmptyFile);
    }

    let chunk = chunk_size.resolve(file_size);
    let count = file_size.div_ceil(chunk) as usize;
    let width = index_width(count);

    let segments = (0..count)
        .map(|index| {
            let offset = index as u64 * chunk;
            let length = chunk.min(file_size - offset);
            Segment::new(index, offset, length, segment_name(object_name, index, width))
        })
        .collect();

    Ok(Plan {
        chunk_size: chunk,
        segments,
    })
}

/// Reject plans the backend would refuse as a single manifest (`max` of 0 disables the check)
pub fn check_segment_limit(plan: &Plan, max: usize) -> Result<(), PlanError> {
    if max > 0 && plan.segment_count() > max {
        return Err(PlanError::TooManySegments {
            segments: plan.segment_count(),
            max,
        });
    }
    Ok(())
}
