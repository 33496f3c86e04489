//! Progress aggregation
//!
//! [`ProgressState`] is the one piece of mutable state every upload worker
//! touches. Workers add bytes with atomic increments; readers only ever get a
//! [`ProgressSnapshot`].
//!
//! Rendering is left to a [`ProgressReporter`]. The coordinator pushes stage
//! changes to it directly, and a [`ProgressPoller`] task pushes snapshots at a
//! fixed interval without the upload ever waiting on it.
//!
//! # Example
//!
//! ```
//! use large_objects::slo::progress::ProgressState;
//!
//! let progress = ProgressState::new(1000);
//! progress.record_uploaded(250);
//! progress.record_skipped(250);
//!
//! let snapshot = progress.snapshot();
//! assert_eq!(snapshot.bytes_transferred(), 500);
//! assert_eq!(snapshot.percent_complete(), 50.0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Shared byte counters for one upload job
#[derive(Debug)]
pub struct ProgressState {
    uploaded: AtomicU64,
    skipped: AtomicU64,
    total: u64,
    started: Instant,
}

impl ProgressState {
    /// Create a tracker expecting `total` bytes; the clock starts now
    pub fn new(total: u64) -> Self {
        Self {
            uploaded: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            total,
            started: Instant::now(),
        }
    }

    /// Credit bytes that were actually sent to the backend
    pub fn record_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Credit bytes of segments found already present
    pub fn record_skipped(&self, bytes: u64) {
        self.skipped.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Point-in-time view of the counters
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            uploaded: self.uploaded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            total: self.total,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Immutable view of a [`ProgressState`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    uploaded: u64,
    skipped: u64,
    total: u64,
    elapsed: Duration,
}

impl ProgressSnapshot {
    /// Bytes uploaded plus bytes credited from skipped segments
    pub fn bytes_transferred(&self) -> u64 {
        self.uploaded + self.skipped
    }

    /// Bytes actually sent during this job
    pub fn bytes_uploaded(&self) -> u64 {
        self.uploaded
    }

    pub fn bytes_skipped(&self) -> u64 {
        self.skipped
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Completion in percent, 0.0 to 100.0
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.bytes_transferred() as f64 / self.total as f64 * 100.0).min(100.0)
    }

    /// Upload throughput in MB/s; skipped bytes are not counted as transferred
    pub fn rate_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.uploaded as f64 / 1_000_000.0 / secs
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_transferred() >= self.total
    }
}

/// Sink for stage transitions and progress snapshots
pub trait ProgressReporter: Send + Sync {
    /// The job entered a new stage
    fn stage(&self, stage: &str);

    /// Periodic progress update
    fn progress(&self, snapshot: &ProgressSnapshot);
}

/// Reporter that renders through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn stage(&self, stage: &str) {
        tracing::info!(stage = stage, "Upload stage");
    }

    fn progress(&self, snapshot: &ProgressSnapshot) {
        tracing::info!(
            percent = format_args!("{:.0}", snapshot.percent_complete()),
            rate_mbps = format_args!("{:.2}", snapshot.rate_mbps()),
            transferred = snapshot.bytes_transferred(),
            total = snapshot.total_bytes(),
            "Upload progress"
        );
    }
}

/// Background task feeding snapshots to a reporter
pub struct ProgressPoller {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ProgressPoller {
    /// Start polling `state` every `interval`
    pub fn spawn(
        state: Arc<ProgressState>,
        reporter: Arc<dyn ProgressReporter>,
        interval: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => reporter.progress(&state.snapshot()),
                }
            }
            reporter.progress(&state.snapshot());
        });

        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Stop polling after one final snapshot
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!(error = %e, "Progress poller ended abnormally");
        }
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.handle.abort();
        }
    }
}
