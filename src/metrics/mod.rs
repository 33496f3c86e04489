//! Metrics module
//!
//! Prometheus metrics for segment uploads, manifest commits and jobs. A CLI
//! run is short-lived, so instead of serving `/metrics` the registry can be
//! written to a node-exporter textfile once the command finishes.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use std::io;
use std::path::Path;

lazy_static! {
    // Segment metrics
    pub static ref SEGMENTS_TOTAL: CounterVec = register_counter_vec!(
        "large_objects_segments_total",
        "Segments processed, by outcome",
        &["status"]  // "uploaded", "failed" or "skipped"
    ).unwrap();

    pub static ref SEGMENT_BYTES_TOTAL: Counter = register_counter!(
        "large_objects_segment_bytes_total",
        "Total segment bytes uploaded"
    ).unwrap();

    pub static ref SEGMENT_DURATION: Histogram = register_histogram!(
        "large_objects_segment_duration_seconds",
        "Segment upload duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Manifest metrics
    pub static ref MANIFEST_COMMITS: CounterVec = register_counter_vec!(
        "large_objects_manifest_commits_total",
        "Manifest commits",
        &["status"]
    ).unwrap();

    // Job metrics
    pub static ref JOBS_TOTAL: CounterVec = register_counter_vec!(
        "large_objects_jobs_total",
        "Large object upload jobs",
        &["status"]
    ).unwrap();

    // Single object metrics
    pub static ref OBJECT_OPERATIONS: CounterVec = register_counter_vec!(
        "large_objects_object_operations_total",
        "Plain object operations",
        &["operation", "status"]
    ).unwrap();

    // Container metrics
    pub static ref CONTAINER_OPERATIONS: CounterVec = register_counter_vec!(
        "large_objects_container_operations_total",
        "Container operations",
        &["operation", "status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "large_objects_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a segment that was uploaded
pub fn record_segment_uploaded(bytes: u64, duration_secs: f64) {
    SEGMENTS_TOTAL.with_label_values(&["uploaded"]).inc();
    SEGMENT_BYTES_TOTAL.inc_by(bytes as f64);
    SEGMENT_DURATION.observe(duration_secs);
}

/// Record a segment upload failure
pub fn record_segment_failed() {
    SEGMENTS_TOTAL.with_label_values(&["failed"]).inc();
}

/// Record segments reused from an earlier run
pub fn record_segments_skipped(count: usize) {
    if count > 0 {
        SEGMENTS_TOTAL
            .with_label_values(&["skipped"])
            .inc_by(count as f64);
    }
}

/// Record a manifest commit attempt
pub fn record_manifest_commit(success: bool) {
    let status = if success { "success" } else { "failure" };
    MANIFEST_COMMITS.with_label_values(&[status]).inc();
}

/// Record a finished job ("success" or "failure")
pub fn record_job(status: &str) {
    JOBS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a plain object operation
pub fn record_object_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    OBJECT_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a container operation
pub fn record_container_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    CONTAINER_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Write the registry to `path` for the node-exporter textfile collector
///
/// Writes to a sibling temp file first and renames it, so the collector never
/// reads a half-written file.
pub fn write_textfile(path: &Path) -> io::Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, render())?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_segment_uploaded() {
        record_segment_uploaded(1024, 0.05);
        assert!(SEGMENT_BYTES_TOTAL.get() >= 1024.0);
    }

    #[test]
    fn test_record_segments_skipped() {
        let before = SEGMENTS_TOTAL.with_label_values(&["skipped"]).get();
        record_segments_skipped(3);
        record_segments_skipped(0);
        let after = SEGMENTS_TOTAL.with_label_values(&["skipped"]).get();
        assert!(after - before >= 3.0);
    }

    #[test]
    fn test_render_contains_metric_names() {
        record_job("success");
        record_manifest_commit(true);
        let text = render();
        assert!(text.contains("large_objects_jobs_total"));
        assert!(text.contains("large_objects_manifest_commits_total"));
    }

    #[test]
    fn test_record_container_operation() {
        let before = CONTAINER_OPERATIONS
            .with_label_values(&["create", "failure"])
            .get();
        record_container_operation("create", false);
        let after = CONTAINER_OPERATIONS
            .with_label_values(&["create", "failure"])
            .get();
        assert!(after - before >= 1.0);
    }

    #[test]
    fn test_write_textfile() {
        record_error("test");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large_objects.prom");
        write_textfile(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("large_objects_errors_total"));
        assert!(!dir.path().join("large_objects.prom.tmp").exists());
    }
}
