//! Segment model
//!
//! A segment is one contiguous byte range of the source file, uploaded as its
//! own object. Offset, length and name are fixed when the plan is made; only
//! the status (and the lazily computed hash) change afterwards.

use std::fmt;

/// Separator between the large object name and the segment index
pub const SEGMENT_INFIX: &str = "-chunk-";

/// Minimum zero-padding width for segment indexes
pub const MIN_INDEX_WIDTH: usize = 4;

/// Upload status of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Pending,
    SkippedExisting,
    Uploading,
    Uploaded,
    Failed,
}

impl SegmentStatus {
    /// True when the segment is known to be present on the backend
    pub fn is_confirmed(self) -> bool {
        matches!(self, SegmentStatus::Uploaded | SegmentStatus::SkippedExisting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::SkippedExisting => "skipped-existing",
            SegmentStatus::Uploading => "uploading",
            SegmentStatus::Uploaded => "uploaded",
            SegmentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned chunk of the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    index: usize,
    offset: u64,
    length: u64,
    name: String,
    hash: Option<String>,
    status: SegmentStatus,
}

impl Segment {
    pub(crate) fn new(index: usize, offset: u64, length: u64, name: String) -> Self {
        Self {
            index,
            offset,
            length,
            name,
            hash: None,
            status: SegmentStatus::Pending,
        }
    }

    /// Sequence index (0-based); defines the order in the manifest
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset in the source file
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Byte length
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Deterministic object name of this segment
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content hash, once the segment has been read or probed
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: SegmentStatus) {
        self.status = status;
    }

    pub(crate) fn set_hash(&mut self, hash: Option<String>) {
        self.hash = hash;
    }
}

/// Name prefix shared by every segment of `object_name`
pub fn segment_prefix(object_name: &str) -> String {
    format!("{}{}", object_name, SEGMENT_INFIX)
}

/// Zero-padding width so that lexicographic order equals sequence order
pub fn index_width(segment_count: usize) -> usize {
    let last = segment_count.saturating_sub(1);
    let digits = last.checked_ilog10().map_or(1, |d| d as usize + 1);
    digits.max(MIN_INDEX_WIDTH)
}

/// Deterministic segment object name, e.g. `disk.img-chunk-0042`
pub fn segment_name(object_name: &str, index: usize, width: usize) -> String {
    format!("{}{:0width$}", segment_prefix(object_name), index, width = width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_width() {
        assert_eq!(index_width(1), 4);
        assert_eq!(index_width(1000), 4);
        assert_eq!(index_width(10_000), 4);
        assert_eq!(index_width(10_001), 5);
        assert_eq!(index_width(123_456), 6);
    }

    #[test]
    fn test_segment_name_is_zero_padded() {
        assert_eq!(segment_name("disk.img", 7, 4), "disk.img-chunk-0007");
        assert_eq!(segment_name("disk.img", 12345, 5), "disk.img-chunk-12345");
    }

    #[test]
    fn test_names_sort_in_sequence_order() {
        let width = index_width(1500);
        let mut names: Vec<_> = (0..1500).map(|i| segment_name("o", i, width)).collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_confirmed_statuses() {
        assert!(SegmentStatus::Uploaded.is_confirmed());
        assert!(SegmentStatus::SkippedExisting.is_confirmed());
        assert!(!SegmentStatus::Pending.is_confirmed());
        assert!(!SegmentStatus::Uploading.is_confirmed());
        assert!(!SegmentStatus::Failed.is_confirmed());
    }
}
