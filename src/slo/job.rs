//! Upload job definition
//!
//! An [`UploadJob`] describes one SLO upload: where the bytes come from, where
//! they go and how they are chunked. It is handed to the coordinator, which
//! owns it until the job finishes.

use super::planner::ChunkSize;
use super::uploader::SegmentSource;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Default segment limit per manifest (Swift's `max_manifest_segments`)
pub const DEFAULT_MAX_SEGMENTS: usize = 1000;

/// How already-present segments are matched when resuming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeCheck {
    /// Same name and byte size
    #[default]
    Size,
    /// Same name and byte size, and the local MD5 equals the listed hash
    SizeAndHash,
}

/// Append-only job log with timestamped lines
///
/// Lines are stamped when [`JobLog::line`] is called and handed to a blocking
/// writer task, so callers on the async runtime never touch the file.
/// Cloning shares the same writer task.
#[derive(Clone)]
pub struct JobLog {
    sender: mpsc::UnboundedSender<LogCommand>,
}

enum LogCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
}

impl JobLog {
    /// Open (or create) `path` for appending
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Self::from_writer(file)
    }

    /// Log into an arbitrary writer
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> io::Result<Self> {
        let handle = Handle::try_current().map_err(io::Error::other)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        handle.spawn_blocking(move || write_log(BufWriter::new(writer), receiver));
        Ok(Self { sender })
    }

    /// Queue one line; write failures are reported through tracing
    pub fn line(&self, message: impl AsRef<str>) {
        let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let line = format!("{} {}", stamp, message.as_ref());
        if self.sender.send(LogCommand::Line(line)).is_err() {
            tracing::warn!("Job log writer has stopped");
        }
    }

    /// Wait until every line queued so far is written and flushed
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(LogCommand::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

/// Writer task body: drain queued commands, flushing after each burst
fn write_log<W: Write>(mut writer: BufWriter<W>, mut receiver: mpsc::UnboundedReceiver<LogCommand>) {
    let apply = |writer: &mut BufWriter<W>, command: LogCommand| match command {
        LogCommand::Line(line) => {
            if let Err(e) = writeln!(writer, "{}", line) {
                tracing::warn!(error = %e, "Failed to write job log");
            }
        }
        LogCommand::Flush(ack) => {
            if let Err(e) = writer.flush() {
                tracing::warn!(error = %e, "Failed to flush job log");
            }
            let _ = ack.send(());
        }
    };

    while let Some(command) = receiver.blocking_recv() {
        apply(&mut writer, command);
        while let Ok(command) = receiver.try_recv() {
            apply(&mut writer, command);
        }
        if let Err(e) = writer.flush() {
            tracing::warn!(error = %e, "Failed to flush job log");
        }
    }
}

impl std::fmt::Debug for JobLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLog").finish_non_exhaustive()
    }
}

/// One Static Large Object upload
#[derive(Debug)]
pub struct UploadJob {
    pub(crate) source: SegmentSource,
    pub(crate) container: String,
    pub(crate) object_name: String,
    pub(crate) chunk_size: ChunkSize,
    pub(crate) concurrency: usize,
    pub(crate) resume: bool,
    pub(crate) resume_check: ResumeCheck,
    pub(crate) max_segments: usize,
    pub(crate) cleanup_on_failure: bool,
    pub(crate) log: Option<JobLog>,
}

impl UploadJob {
    /// Upload `source` as `container/object_name` with default options
    pub fn new(
        source: SegmentSource,
        container: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            container: container.into(),
            object_name: object_name.into(),
            chunk_size: ChunkSize::Auto,
            concurrency: default_concurrency(),
            resume: false,
            resume_check: ResumeCheck::Size,
            max_segments: DEFAULT_MAX_SEGMENTS,
            cleanup_on_failure: false,
            log: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: ChunkSize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Worker count; 0 selects the host's available parallelism
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = if concurrency == 0 {
            default_concurrency()
        } else {
            concurrency
        };
        self
    }

    /// Only upload segments not already present
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_resume_check(mut self, check: ResumeCheck) -> Self {
        self.resume_check = check;
        self
    }

    /// Segment limit per manifest; 0 disables the check
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Delete segments uploaded by this job if it fails
    pub fn with_cleanup_on_failure(mut self, cleanup: bool) -> Self {
        self.cleanup_on_failure = cleanup;
        self
    }

    pub fn with_log(mut self, log: JobLog) -> Self {
        self.log = Some(log);
        self
    }

    pub(crate) fn log_line(&self, message: impl AsRef<str>) {
        if let Some(ref log) = self.log {
            log.line(message);
        }
    }

    pub(crate) async fn flush_log(&self) {
        if let Some(ref log) = self.log {
            log.flush().await;
        }
    }
}

/// Worker count used when none is configured
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
