//! Upload coordinator
//!
//! Drives one [`UploadJob`] through its phases:
//!
//! ```text
//! Planning -> Probing -> Dispatching -> Awaiting -> Committing -> Done
//!     \__________\___________\____________\____________\______-> Failed
//! ```
//!
//! Pending segments go into a shared queue drained by a fixed pool of worker
//! tasks. The first failure wins a write-once slot and raises the abort flag;
//! workers stop taking new segments but let their in-flight upload finish.
//! The manifest is committed at most once, and only when every planned
//! segment is confirmed.

use super::job::{JobLog, UploadJob};
use super::manifest::{Manifest, ManifestCommitter};
use super::planner::{check_segment_limit, plan};
use super::prober::{probe, verify_hashes, ProbeSummary};
use super::progress::{ProgressReporter, ProgressState};
use super::segment::{segment_prefix, Segment, SegmentStatus};
use super::uploader::{SegmentSource, SegmentUploader};
use super::SloError;
use crate::metrics;
use crate::store::ObjectStore;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Planning,
    Probing,
    Dispatching,
    Awaiting,
    Committing,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Planning => "planning",
            JobState::Probing => "probing",
            JobState::Dispatching => "dispatching",
            JobState::Awaiting => "awaiting",
            JobState::Committing => "committing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a successful upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub container: String,
    pub object_name: String,
    pub segments_total: usize,
    pub segments_uploaded: usize,
    pub segments_skipped: usize,
    /// Bytes sent during this run (skipped segments excluded)
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    pub manifest_etag: Option<String>,
    pub elapsed: Duration,
}

/// State shared by the coordinator and its workers during dispatch
struct Dispatch {
    queue: Mutex<VecDeque<Segment>>,
    abort: AtomicBool,
    first_error: Mutex<Option<SloError>>,
    /// Names confirmed by the backend, kept even if their worker dies later
    uploaded: Mutex<Vec<String>>,
}

impl Dispatch {
    fn new(pending: Vec<Segment>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::from(pending)),
            abort: AtomicBool::new(false),
            first_error: Mutex::new(None),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    fn confirm(&self, name: &str) {
        self.uploaded.lock().push(name.to_string());
    }

    fn take_uploaded(&self) -> Vec<String> {
        std::mem::take(&mut *self.uploaded.lock())
    }

    /// Next segment to upload, or `None` once the queue is empty or aborted
    ///
    /// The abort flag is read under the queue lock, so no segment is handed
    /// out after [`Dispatch::fail`] returns.
    fn next(&self) -> Option<Segment> {
        let mut queue = self.queue.lock();
        if self.abort.load(Ordering::Acquire) {
            return None;
        }
        queue.pop_front()
    }

    /// Record a failure; only the first one is kept
    fn fail(&self, err: SloError) {
        let _queue = self.queue.lock();
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.abort.store(true, Ordering::Release);
    }

    fn take_error(&self) -> Option<SloError> {
        self.first_error.lock().take()
    }

    fn drain(&self) -> Vec<Segment> {
        self.queue.lock().drain(..).collect()
    }
}

/// One worker task
struct Worker {
    id: usize,
    dispatch: Arc<Dispatch>,
    uploader: SegmentUploader,
    source: SegmentSource,
    log: Option<JobLog>,
}

impl Worker {
    fn log_line(&self, message: String) {
        if let Some(ref log) = self.log {
            log.line(message);
        }
    }

    /// Upload segments until the queue is empty or the job aborts
    ///
    /// Returns every segment this worker took, whatever its final status.
    async fn run(self) -> Vec<Segment> {
        let mut finished = Vec::new();

        let mut reader = match self.source.reader().await {
            Ok(reader) => reader,
            Err(e) => {
                self.dispatch.fail(SloError::Worker(format!(
                    "worker {} cannot open {}: {}",
                    self.id,
                    self.source.path().display(),
                    e
                )));
                return finished;
            }
        };

        while let Some(mut segment) = self.dispatch.next() {
            match self.uploader.upload(&mut segment, &mut reader).await {
                Ok(()) => {
                    self.dispatch.confirm(segment.name());
                    self.log_line(format!(
                        "segment {} {} uploaded {} bytes",
                        segment.index(),
                        segment.name(),
                        segment.length()
                    ));
                }
                Err(source) => {
                    self.log_line(format!(
                        "segment {} {} failed: {}",
                        segment.index(),
                        segment.name(),
                        source
                    ));
                    self.dispatch.fail(SloError::Segment {
                        index: segment.index(),
                        name: segment.name().to_string(),
                        source,
                    });
                }
            }
            finished.push(segment);
        }

        debug!(worker = self.id, segments = finished.len(), "Worker finished");
        finished
    }
}

/// Runs one upload job against an object store
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    job: UploadJob,
    progress: Arc<ProgressState>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    state: JobState,
    /// Segments written by this run, for cleanup after a failure
    uploaded_names: Vec<String>,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, job: UploadJob) -> Self {
        let progress = Arc::new(ProgressState::new(job.source.size()));
        Self {
            store,
            job,
            progress,
            reporter: None,
            state: JobState::Planning,
            uploaded_names: Vec::new(),
        }
    }

    /// Push stage changes to `reporter`
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Shared progress counters, for pollers
    pub fn progress(&self) -> Arc<ProgressState> {
        Arc::clone(&self.progress)
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run the job to completion
    #[instrument(
        name = "slo.job",
        skip(self),
        fields(
            container = %self.job.container,
            object = %self.job.object_name,
            size = self.job.source.size(),
            concurrency = self.job.concurrency,
        )
    )]
    pub async fn run(&mut self) -> Result<UploadReport, SloError> {
        let start = Instant::now();
        self.job.log_line(format!(
            "start {} -> {}/{} ({} bytes)",
            self.job.source.path().display(),
            self.job.container,
            self.job.object_name,
            self.job.source.size()
        ));

        let result = match self.execute(start).await {
            Ok(report) => {
                self.transition(JobState::Done);
                metrics::record_job("success");
                info!(
                    segments = report.segments_total,
                    uploaded = report.segments_uploaded,
                    skipped = report.segments_skipped,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Static large object created"
                );
                Ok(report)
            }
            Err(e) => {
                let phase = e.phase();
                error!(phase = %phase, error = %e, "Upload job failed");
                self.job.log_line(format!("error in {}: {}", phase, e));
                metrics::record_job("failure");
                metrics::record_error(e.kind());

                if self.job.cleanup_on_failure
                    && matches!(phase, JobState::Awaiting | JobState::Committing)
                {
                    self.cleanup().await;
                }
                self.transition(JobState::Failed);
                Err(e)
            }
        };

        self.job.flush_log().await;
        result
    }

    async fn execute(&mut self, start: Instant) -> Result<UploadReport, SloError> {
        // Planning
        self.transition(JobState::Planning);
        let plan = plan(&self.job.object_name, self.job.source.size(), self.job.chunk_size)?;
        check_segment_limit(&plan, self.job.max_segments)?;
        let expected = plan.segment_count();
        self.job.log_line(format!(
            "planned {} segments of {} bytes",
            expected, plan.chunk_size
        ));
        let mut segments = plan.segments;

        // Probing
        self.transition(JobState::Probing);
        let summary = self.probe_existing(&mut segments).await?;
        self.progress.record_skipped(summary.skipped_bytes);
        metrics::record_segments_skipped(summary.skipped_segments);
        if summary.skipped_segments > 0 {
            info!(
                skipped = summary.skipped_segments,
                bytes = summary.skipped_bytes,
                "Reusing existing segments"
            );
            self.job.log_line(format!(
                "reusing {} existing segments ({} bytes)",
                summary.skipped_segments, summary.skipped_bytes
            ));
        }

        // Dispatching
        self.transition(JobState::Dispatching);
        let (pending, mut finished): (Vec<Segment>, Vec<Segment>) = segments
            .into_iter()
            .partition(|s| s.status() == SegmentStatus::Pending);
        let workers = self.job.concurrency.max(1).min(pending.len());
        let dispatch = Arc::new(Dispatch::new(pending));
        let uploader = SegmentUploader::new(
            Arc::clone(&self.store),
            self.job.container.clone(),
            Arc::clone(&self.progress),
        );

        let mut set = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                dispatch: Arc::clone(&dispatch),
                uploader: uploader.clone(),
                source: self.job.source.clone(),
                log: self.job.log.clone(),
            };
            set.spawn(worker.run().instrument(info_span!("slo.worker", worker = id)));
        }
        debug!(workers, "Workers started");

        // Awaiting
        self.transition(JobState::Awaiting);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(done) => finished.extend(done),
                Err(e) => dispatch.fail(SloError::Worker(e.to_string())),
            }
        }
        finished.extend(dispatch.drain());

        self.uploaded_names = dispatch.take_uploaded();

        if let Some(e) = dispatch.take_error() {
            return Err(e);
        }

        // Committing
        self.transition(JobState::Committing);
        finished.sort_by_key(Segment::index);
        let confirmed = finished
            .iter()
            .filter(|s| s.status().is_confirmed())
            .count();
        if confirmed != expected || finished.len() != expected {
            return Err(SloError::Incomplete {
                confirmed,
                expected,
            });
        }

        let manifest = Manifest::from_segments(&self.job.container, &finished)?;
        let committed = ManifestCommitter::new(Arc::clone(&self.store))
            .commit(&self.job.container, &self.job.object_name, &manifest)
            .await;
        metrics::record_manifest_commit(committed.is_ok());
        let response = committed?;
        self.job.log_line(format!(
            "committed manifest {}/{} with {} segments",
            self.job.container, self.job.object_name, expected
        ));

        let snapshot = self.progress.snapshot();
        Ok(UploadReport {
            container: self.job.container.clone(),
            object_name: self.job.object_name.clone(),
            segments_total: expected,
            segments_uploaded: self.uploaded_names.len(),
            segments_skipped: summary.skipped_segments,
            bytes_uploaded: snapshot.bytes_uploaded(),
            total_bytes: snapshot.total_bytes(),
            manifest_etag: response.etag,
            elapsed: start.elapsed(),
        })
    }

    /// List existing segments and mark the reusable ones
    async fn probe_existing(&self, segments: &mut [Segment]) -> Result<ProbeSummary, SloError> {
        if !self.job.resume {
            return Ok(ProbeSummary::default());
        }

        let prefix = segment_prefix(&self.job.object_name);
        let existing = self
            .store
            .list_objects(&self.job.container, Some(&prefix))
            .await
            .map_err(SloError::Probing)?;
        debug!(listed = existing.len(), "Listed existing segments");

        probe(&existing, segments, true);
        verify_hashes(&self.job.source, segments, self.job.resume_check)
            .await
            .map_err(SloError::Verify)
    }

    /// Best-effort delete of the segments this run uploaded
    async fn cleanup(&mut self) {
        let names = std::mem::take(&mut self.uploaded_names);
        if names.is_empty() {
            return;
        }

        warn!(segments = names.len(), "Deleting segments uploaded by the failed job");
        let mut deleted = 0usize;
        for name in &names {
            match self
                .store
                .delete_object(&self.job.container, name, false)
                .await
            {
                Ok(()) => deleted += 1,
                Err(e) => warn!(segment = %name, error = %e, "Failed to delete segment"),
            }
        }
        self.job.log_line(format!(
            "cleanup deleted {} of {} segments",
            deleted,
            names.len()
        ));
    }

    fn transition(&mut self, state: JobState) {
        self.state = state;
        debug!(state = %state, "Job state changed");
        if let Some(ref reporter) = self.reporter {
            reporter.stage(state.as_str());
        }
        self.job.log_line(format!("stage {}", state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slo::planner::ChunkSize;
    use crate::store::MemoryStore;
    use std::io::Write;

    #[derive(Default)]
    struct Stages(parking_lot::Mutex<Vec<String>>);

    impl ProgressReporter for Stages {
        fn stage(&self, stage: &str) {
            self.0.lock().push(stage.to_string());
        }

        fn progress(&self, _snapshot: &crate::slo::ProgressSnapshot) {}
    }

    async fn job(data: &[u8]) -> (tempfile::NamedTempFile, UploadJob) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        let source = SegmentSource::open(file.path()).await.unwrap();
        (file, UploadJob::new(source, "c", "o"))
    }

    #[tokio::test]
    async fn test_stages_reported_in_order() {
        let store = Arc::new(MemoryStore::new());
        store.create_container("c");
        let (_file, job) = job(b"0123456789").await;
        let stages = Arc::new(Stages::default());

        let mut coordinator = UploadCoordinator::new(store, job.with_chunk_size(ChunkSize::Bytes(3)))
            .with_reporter(stages.clone());
        let report = coordinator.run().await.unwrap();

        assert_eq!(coordinator.state(), JobState::Done);
        assert_eq!(report.segments_total, 4);
        assert_eq!(
            *stages.0.lock(),
            vec![
                "planning",
                "probing",
                "dispatching",
                "awaiting",
                "committing",
                "done"
            ]
        );
    }

    #[tokio::test]
    async fn test_too_many_segments_fails_in_planning() {
        let store = Arc::new(MemoryStore::new());
        store.create_container("c");
        let (_file, job) = job(&[7u8; 50]).await;

        let mut coordinator = UploadCoordinator::new(
            store.clone(),
            job.with_chunk_size(ChunkSize::Bytes(1)).with_max_segments(10),
        );
        let err = coordinator.run().await.unwrap_err();

        assert_eq!(err.phase(), JobState::Planning);
        assert_eq!(coordinator.state(), JobState::Failed);
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_container_fails_without_commit() {
        let store = Arc::new(MemoryStore::new());
        let (_file, job) = job(b"abc").await;

        let mut coordinator = UploadCoordinator::new(store.clone(), job);
        let err = coordinator.run().await.unwrap_err();

        assert!(matches!(err, SloError::Segment { index: 0, .. }));
        assert_eq!(store.manifest_count(), 0);
    }

    fn pending(count: usize) -> Vec<Segment> {
        (0..count)
            .map(|i| Segment::new(i, i as u64, 1, format!("o-chunk-{:04}", i)))
            .collect()
    }

    #[test]
    fn test_dispatch_stops_handing_out_segments_after_failure() {
        let dispatch = Dispatch::new(pending(3));
        assert_eq!(dispatch.next().map(|s| s.index()), Some(0));

        dispatch.fail(SloError::Worker("boom".into()));
        assert!(dispatch.next().is_none());
        let left: Vec<_> = dispatch.drain().iter().map(Segment::index).collect();
        assert_eq!(left, vec![1, 2]);
    }

    #[test]
    fn test_queue_is_frozen_once_failure_is_recorded() {
        let dispatch = Arc::new(Dispatch::new(pending(100_000)));

        let takers: Vec<_> = (0..4)
            .map(|_| {
                let dispatch = Arc::clone(&dispatch);
                std::thread::spawn(move || {
                    let mut taken = 0usize;
                    while dispatch.next().is_some() {
                        taken += 1;
                    }
                    taken
                })
            })
            .collect();

        std::thread::yield_now();
        dispatch.fail(SloError::Worker("boom".into()));
        let left_at_failure = dispatch.queue.lock().len();

        let taken: usize = takers.into_iter().map(|t| t.join().unwrap()).sum();
        let left = dispatch.drain().len();

        assert_eq!(left, left_at_failure);
        assert_eq!(taken + left, 100_000);
    }

    #[test]
    fn test_dispatch_keeps_first_error() {
        let dispatch = Dispatch::new(Vec::new());
        dispatch.fail(SloError::Worker("first".into()));
        dispatch.fail(SloError::Worker("second".into()));
        assert!(dispatch.next().is_none());
        match dispatch.take_error() {
            Some(SloError::Worker(message)) => assert_eq!(message, "first"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
