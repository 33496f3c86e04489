//! Resume prober
//!
//! Compares the planned segments with what the container already holds and
//! marks matches as `SkippedExisting`. A listed object matches a planned
//! segment when the names are equal and the sizes are equal; everything else
//! (wrong size, unrelated names, extra segments from a different chunking)
//! is ignored and the segment stays pending.

use super::job::ResumeCheck;
use super::segment::{Segment, SegmentStatus};
use super::uploader::SegmentSource;
use crate::store::ObjectInfo;
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of probing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub skipped_segments: usize,
    pub skipped_bytes: u64,
}

/// Mark planned segments already present in `existing`
///
/// With `resume` off, nothing is skipped. A skipped segment takes the listed
/// hash as its own.
pub fn probe(existing: &[ObjectInfo], planned: &mut [Segment], resume: bool) -> ProbeSummary {
    let mut summary = ProbeSummary::default();
    if !resume {
        return summary;
    }

    let by_name: HashMap<&str, &ObjectInfo> =
        existing.iter().map(|o| (o.name.as_str(), o)).collect();

    for segment in planned.iter_mut() {
        let Some(found) = by_name.get(segment.name()) else {
            continue;
        };
        if found.size != segment.length() {
            debug!(
                segment = %segment.name(),
                remote_size = found.size,
                planned_size = segment.length(),
                "Existing segment has different size, re-uploading"
            );
            continue;
        }
        segment.set_hash(found.hash.clone());
        segment.set_status(SegmentStatus::SkippedExisting);
        summary.skipped_segments += 1;
        summary.skipped_bytes += segment.length();
    }

    summary
}

/// Re-check skipped segments against their local content
///
/// Only does work for [`ResumeCheck::SizeAndHash`]. A skipped segment whose
/// listed hash is missing or differs from the MD5 of the local byte range is
/// demoted back to `Pending`. Returns the updated summary.
pub async fn verify_hashes(
    source: &SegmentSource,
    planned: &mut [Segment],
    check: ResumeCheck,
) -> std::io::Result<ProbeSummary> {
    if check == ResumeCheck::Size {
        return Ok(summarize(planned));
    }

    let mut reader = source.reader().await?;
    let mut demoted = 0usize;
    for segment in planned
        .iter_mut()
        .filter(|s| s.status() == SegmentStatus::SkippedExisting)
    {
        let local = reader.hash(segment.offset(), segment.length()).await?;
        let matches = segment
            .hash()
            .is_some_and(|remote| remote.eq_ignore_ascii_case(&local));
        if !matches {
            debug!(segment = %segment.name(), "Existing segment content differs, re-uploading");
            segment.set_hash(None);
            segment.set_status(SegmentStatus::Pending);
            demoted += 1;
        }
    }

    if demoted > 0 {
        info!(demoted, "Existing segments failed hash verification");
    }
    Ok(summarize(planned))
}

fn summarize(planned: &[Segment]) -> ProbeSummary {
    planned
        .iter()
        .filter(|s| s.status() == SegmentStatus::SkippedExisting)
        .fold(ProbeSummary::default(), |mut acc, s| {
            acc.skipped_segments += 1;
            acc.skipped_bytes += s.length();
            acc
        })
}
