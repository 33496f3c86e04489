//! Large Objects Library
//!
//! Segmented uploads of multi-gigabyte files to OpenStack Swift object
//! storage as Static Large Objects (SLO).
//!
//! # Features
//!
//! - **Segmented**: Splits a file into deterministically named segments
//! - **Parallel**: Uploads segments with a bounded pool of workers
//! - **Resumable**: Reuses segments already present from an earlier run
//! - **Verified**: Every segment PUT carries its MD5 as the ETag
//! - **Atomic Commit**: The manifest is written once, after every segment is confirmed
//! - **Housekeeping**: Plain object and container operations for the same account
//!
//! # Example
//!
//! ```no_run
//! use large_objects::config::Config;
//! use large_objects::slo::{SegmentSource, UploadCoordinator, UploadJob};
//! use large_objects::store::SwiftClient;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("large-objects.yaml")?;
//!     let service = config.service("object-storage")?;
//!     let store = Arc::new(SwiftClient::new(service.client_config())?);
//!
//!     let source = SegmentSource::open("disk.img").await?;
//!     let job = UploadJob::new(source, "backups", "disk.img");
//!     let report = UploadCoordinator::new(store, job).run().await?;
//!     println!("Uploaded {} segments", report.segments_uploaded);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod container;
pub mod logging;
pub mod metrics;
pub mod object;
pub mod slo;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use slo::{UploadCoordinator, UploadJob, UploadReport};
pub use store::{MemoryStore, ObjectStore, SwiftClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
