//! Large Objects - Segmented uploads to OpenStack Swift
//!
//! Creates Static Large Objects from local files and manages plain objects
//! and containers.

use anyhow::Context;
use clap::{Parser, Subcommand};
use large_objects::config::{Config, ServiceConfig, DEFAULT_CONFIG_FILE};
use large_objects::slo::{
    ChunkSize, JobLog, LogReporter, ProgressPoller, ProgressReporter, ResumeCheck, SegmentSource,
    UploadCoordinator, UploadJob,
};
use large_objects::store::SwiftClient;
use large_objects::container::{self, GLOBAL_READ_HEADER, REMOVE_READ_HEADER};
use large_objects::{logging, metrics, object};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Large Objects - Static Large Object uploads for OpenStack Swift
#[derive(Parser, Debug)]
#[command(name = "large-objects")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'L', long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file as a Static Large Object
    MakeSlo {
        /// Configured service name
        service: String,
        /// Destination container
        container: String,
        /// Name of the large object
        object: String,
        /// Local file to upload
        source: PathBuf,

        /// Only upload segments that are not already present
        #[arg(short = 'm', long = "missing-only")]
        missing_only: bool,

        /// Append a job log to this file
        #[arg(short = 'o', long = "output-file")]
        output_file: Option<PathBuf>,

        /// Segment size in bytes (0 or less picks one automatically)
        #[arg(
            short = 's',
            long = "chunk-size",
            allow_negative_numbers = true,
            conflicts_with = "chunk_count"
        )]
        chunk_size: Option<i64>,

        /// Number of segments to aim for
        #[arg(short = 'n', long = "num-chunks")]
        chunk_count: Option<u64>,

        /// Number of upload workers (0 uses every core)
        #[arg(short = 't', long = "threads")]
        threads: Option<usize>,

        /// Verify reused segments by hashing their local bytes
        #[arg(long)]
        verify_hash: bool,

        /// Delete this run's segments if the upload fails
        #[arg(long)]
        cleanup_on_failure: bool,
    },

    /// Upload a file (up to 5 GB) as a single object
    PutObject {
        service: String,
        container: String,
        source: PathBuf,
        /// Object name (defaults to the file name)
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
    },

    /// Download an object to a local file
    GetObject {
        service: String,
        container: String,
        object: String,
        /// Local path to write
        destination: PathBuf,
    },

    /// Rename an object within its container
    RenameObject {
        service: String,
        container: String,
        object: String,
        new_name: String,
    },

    /// Copy an object to another container
    CopyObject {
        service: String,
        container: String,
        object: String,
        new_container: String,
        /// Name in the destination container (defaults to the current name)
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
    },

    /// Delete an object
    DeleteObject {
        service: String,
        container: String,
        object: String,
        /// Delete a large object together with its segments
        #[arg(short = 'l', long = "large-object")]
        large_object: bool,
    },

    /// List the objects in a container
    ShowObjects { service: String, container: String },

    /// Show size, ETag and type of an object
    ObjectInfo {
        service: String,
        container: String,
        object: String,
    },

    /// List the containers of the account
    ShowContainers { service: String },

    /// Show object count, bytes used and headers of a container
    ContainerInfo { service: String, container: String },

    /// Create a container
    MakeContainer {
        service: String,
        container: String,
        /// Headers as name:value
        headers: Vec<String>,
        #[command(flatten)]
        read: ReadAccess,
    },

    /// Set or remove headers on a container
    UpdateContainer {
        service: String,
        container: String,
        /// Headers as name:value
        headers: Vec<String>,
        #[command(flatten)]
        read: ReadAccess,
    },

    /// Delete a container
    DeleteContainer {
        service: String,
        container: String,
        /// Delete every object in the container first
        #[arg(short = 'f', long)]
        force: bool,
    },
}

/// Shortcuts for the container read ACL
#[derive(clap::Args, Debug)]
struct ReadAccess {
    /// Allow anonymous reads and listings
    #[arg(short = 'r', long = "global-read", conflicts_with = "remove_read")]
    global_read: bool,

    /// Remove every read restriction header
    #[arg(long = "remove-read")]
    remove_read: bool,
}

impl ReadAccess {
    /// `headers` plus the shortcut header, if one was requested
    fn with_headers(&self, mut headers: Vec<String>) -> Vec<String> {
        let shortcut = if self.global_read {
            Some(GLOBAL_READ_HEADER)
        } else if self.remove_read {
            Some(REMOVE_READ_HEADER)
        } else {
            None
        };
        if let Some((name, value)) = shortcut {
            headers.push(format!("{}:{}", name, value));
        }
        headers
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    logging::init_subscriber(&config.logging)?;
    info!("Starting large-objects v{}", large_objects::VERSION);

    let result = run(args.command, &config).await;

    if let Some(ref path) = config.metrics.textfile {
        if let Err(e) = metrics::write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
        }
    }

    result
}

fn client(config: &Config, service: &str) -> anyhow::Result<Arc<SwiftClient>> {
    let service: &ServiceConfig = config.service(service)?;
    let client = SwiftClient::new(service.client_config())
        .with_context(|| format!("Failed to create client for service '{}'", service.name))?;
    Ok(Arc::new(client))
}

async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::MakeSlo {
            service,
            container,
            object,
            source,
            missing_only,
            output_file,
            chunk_size,
            chunk_count,
            threads,
            verify_hash,
            cleanup_on_failure,
        } => {
            let store = client(config, &service)?;
            let chunking = match (chunk_size, chunk_count) {
                (_, Some(count)) => ChunkSize::Count(count),
                (Some(bytes), None) => ChunkSize::from_requested_bytes(bytes),
                (None, None) => ChunkSize::Auto,
            };
            let resume_check = if verify_hash {
                ResumeCheck::SizeAndHash
            } else {
                config.upload.resume_check
            };

            let source = SegmentSource::open(&source)
                .await
                .with_context(|| format!("Failed to open source file {}", source.display()))?;
            let mut job = UploadJob::new(source, container.as_str(), object.as_str())
                .with_chunk_size(chunking)
                .with_concurrency(threads.unwrap_or(config.upload.concurrency))
                .with_resume(missing_only)
                .with_resume_check(resume_check)
                .with_max_segments(config.upload.max_segments)
                .with_cleanup_on_failure(cleanup_on_failure || config.upload.cleanup_on_failure);
            if let Some(ref path) = output_file {
                let log = JobLog::open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?;
                job = job.with_log(log);
            }

            let reporter: Arc<dyn ProgressReporter> = Arc::new(LogReporter);
            let mut coordinator =
                UploadCoordinator::new(store, job).with_reporter(Arc::clone(&reporter));
            let poller = ProgressPoller::spawn(
                coordinator.progress(),
                reporter,
                config.upload.progress_interval(),
            );
            let result = coordinator.run().await;
            poller.stop().await;

            let report = result
                .with_context(|| format!("Failed to create SLO {} in container {}", object, container))?;
            info!(
                segments = report.segments_total,
                uploaded = report.segments_uploaded,
                skipped = report.segments_skipped,
                "Upload report"
            );
            println!(
                "Successfully created SLO {} in container {}",
                report.object_name, report.container
            );
        }

        Command::PutObject {
            service,
            container,
            source,
            name,
        } => {
            let store = client(config, &service)?;
            let name = match name {
                Some(name) => name,
                None => file_name(&source)?,
            };
            let response = object::put_object(store.as_ref(), &container, &name, &source)
                .await
                .with_context(|| format!("Failed to upload {}", source.display()))?;
            println!(
                "Successfully uploaded {} to container {} (ETag {})",
                name,
                container,
                response.etag.as_deref().unwrap_or("unknown")
            );
        }

        Command::GetObject {
            service,
            container,
            object,
            destination,
        } => {
            let store = client(config, &service)?;
            let bytes = object::get_object(store.as_ref(), &container, &object, &destination)
                .await
                .with_context(|| format!("Failed to get object {}", object))?;
            println!(
                "Successfully downloaded {} ({} bytes) to {}",
                object,
                bytes,
                destination.display()
            );
        }

        Command::RenameObject {
            service,
            container,
            object,
            new_name,
        } => {
            let store = client(config, &service)?;
            object::rename_object(store.as_ref(), &container, &object, &new_name)
                .await
                .with_context(|| format!("Failed to rename object {}", object))?;
            println!("Successfully renamed {} to {}", object, new_name);
        }

        Command::CopyObject {
            service,
            container,
            object,
            new_container,
            name,
        } => {
            let store = client(config, &service)?;
            let dest_name = name.unwrap_or_else(|| object.clone());
            object::copy_object(store.as_ref(), &container, &object, &new_container, &dest_name)
                .await
                .with_context(|| format!("Failed to copy object {}", object))?;
            println!(
                "Successfully copied {} to {}/{}",
                object, new_container, dest_name
            );
        }

        Command::DeleteObject {
            service,
            container,
            object,
            large_object,
        } => {
            let store = client(config, &service)?;
            object::delete_object(store.as_ref(), &container, &object, large_object)
                .await
                .with_context(|| format!("Failed to delete {}", object))?;
            println!("Successfully deleted {} from container {}", object, container);
        }

        Command::ShowObjects { service, container } => {
            let store = client(config, &service)?;
            let names = object::show_objects(store.as_ref(), &container)
                .await
                .with_context(|| format!("Failed to list container {}", container))?;
            for name in names {
                println!("{}", name);
            }
        }

        Command::ObjectInfo {
            service,
            container,
            object,
        } => {
            let store = client(config, &service)?;
            let info = object::object_info(store.as_ref(), &container, &object)
                .await
                .with_context(|| format!("Failed to get info for {}", object))?;
            println!("Name: {}", info.name);
            println!("Size: {}", info.size);
            println!("ETag: {}", info.hash.as_deref().unwrap_or("unknown"));
            println!(
                "Content-Type: {}",
                info.content_type.as_deref().unwrap_or("unknown")
            );
            println!("Static Large Object: {}", info.is_static_large_object);
        }

        Command::ShowContainers { service } => {
            let store = client(config, &service)?;
            let names = container::show_containers(store.as_ref())
                .await
                .context("Failed to list containers")?;
            for name in names {
                println!("{}", name);
            }
        }

        Command::ContainerInfo { service, container } => {
            let store = client(config, &service)?;
            let info = container::container_info(store.as_ref(), &container)
                .await
                .with_context(|| format!("Failed to get info for container {}", container))?;
            println!("Name: {}", info.name);
            println!("Objects: {}", info.object_count);
            println!("Bytes Used: {}", info.bytes_used);
            for (name, value) in &info.headers {
                println!("{}: {}", name, value);
            }
        }

        Command::MakeContainer {
            service,
            container,
            headers,
            read,
        } => {
            let store = client(config, &service)?;
            container::make_container(store.as_ref(), &container, &read.with_headers(headers))
                .await
                .with_context(|| format!("Failed to create container {}", container))?;
            println!("Successfully created container {}", container);
        }

        Command::UpdateContainer {
            service,
            container,
            headers,
            read,
        } => {
            let store = client(config, &service)?;
            container::update_container(store.as_ref(), &container, &read.with_headers(headers))
                .await
                .with_context(|| format!("Failed to update container {}", container))?;
            println!("Successfully updated container {}", container);
        }

        Command::DeleteContainer {
            service,
            container,
            force,
        } => {
            let store = client(config, &service)?;
            container::delete_container(store.as_ref(), &container, force)
                .await
                .with_context(|| format!("Failed to delete container {}", container))?;
            println!("Successfully deleted container {}", container);
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Cannot derive an object name from {}", path.display()))
}
