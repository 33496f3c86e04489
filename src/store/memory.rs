//! In-memory object store
//!
//! Behaves like a Swift account for the operations in [`ObjectStore`]:
//! containers must exist, PUTs with an ETag are integrity checked, SLO
//! manifests are validated against their segments and served back as the
//! concatenation of those segments.
//!
//! Test hooks: per-request latency, failure and panic injection for named
//! objects, listings and manifests, and counters for puts, manifest commits
//! and peak request concurrency.
//!
//! # Example
//!
//! ```
//! use large_objects::store::{MemoryStore, ObjectStore};
//! use bytes::Bytes;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.create_container("backups");
//! store
//!     .put_object("backups", "a.txt", Bytes::from("hello"), None, None)
//!     .await
//!     .unwrap();
//! assert_eq!(store.object_count("backups"), 1);
//! # });
//! ```

use super::{content_hash, ContainerInfo, ObjectInfo, ObjectStore, PutObjectResponse, StoreError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Segment reference inside an SLO manifest body
#[derive(Debug, Clone, Deserialize)]
struct SegmentRef {
    path: String,
    #[serde(default)]
    etag: Option<String>,
    size_bytes: u64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    content_type: Option<String>,
    /// Present when this object is an SLO manifest
    segments: Option<Vec<SegmentRef>>,
}

impl StoredObject {
    fn size(&self) -> u64 {
        match &self.segments {
            Some(segments) => segments.iter().map(|s| s.size_bytes).sum(),
            None => self.data.len() as u64,
        }
    }
}

/// In-memory [`ObjectStore`]
#[derive(Default)]
pub struct MemoryStore {
    /// Container name to its headers
    containers: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    latency: Mutex<Option<Duration>>,
    failing_objects: Mutex<HashSet<String>>,
    panicking_objects: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    fail_manifest: AtomicBool,
    put_count: AtomicUsize,
    manifest_count: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter when a request finishes
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    /// Create an empty store with no containers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container (no-op if it exists)
    pub fn create_container(&self, container: &str) {
        self.containers
            .lock()
            .entry(container.to_string())
            .or_default();
    }

    /// Delay every object PUT by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Make every PUT of `name` fail with a 503
    pub fn fail_object(&self, name: &str) {
        self.failing_objects.lock().insert(name.to_string());
    }

    /// Make every PUT of `name` panic, as a crashed upload task would
    pub fn panic_object(&self, name: &str) {
        self.panicking_objects.lock().insert(name.to_string());
    }

    /// Make container listings fail
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Make manifest PUTs fail
    pub fn fail_manifest(&self, fail: bool) {
        self.fail_manifest.store(fail, Ordering::SeqCst);
    }

    /// Successful object PUTs (manifests excluded)
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Successful manifest PUTs
    pub fn manifest_count(&self) -> usize {
        self.manifest_count.load(Ordering::SeqCst)
    }

    /// Highest number of object PUTs observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Number of objects (manifests included) stored in `container`
    pub fn object_count(&self, container: &str) -> usize {
        self.objects
            .lock()
            .keys()
            .filter(|(c, _)| c == container)
            .count()
    }

    /// Raw manifest body as uploaded, if `name` is an SLO manifest
    pub fn manifest_body(&self, container: &str, name: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .get(&(container.to_string(), name.to_string()))
            .filter(|o| o.segments.is_some())
            .map(|o| o.data.clone())
    }

    fn ensure_container(&self, container: &str) -> Result<(), StoreError> {
        if self.containers.lock().contains_key(container) {
            Ok(())
        } else {
            Err(StoreError::NotFound(container.to_string()))
        }
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    /// Split `/container/object` into its parts
    fn split_path(path: &str) -> Option<(String, String)> {
        let trimmed = path.strip_prefix('/')?;
        let (container, name) = trimmed.split_once('/')?;
        if container.is_empty() || name.is_empty() {
            return None;
        }
        Some((container.to_string(), name.to_string()))
    }

    fn container_info(
        objects: &BTreeMap<(String, String), StoredObject>,
        container: &str,
        headers: &BTreeMap<String, String>,
    ) -> ContainerInfo {
        let (object_count, bytes_used) = objects
            .iter()
            .filter(|((c, _), _)| c == container)
            .fold((0u64, 0u64), |(count, bytes), (_, o)| {
                (count + 1, bytes + o.data.len() as u64)
            });
        ContainerInfo {
            name: container.to_string(),
            object_count,
            bytes_used,
            headers: headers.clone(),
        }
    }

    fn read(
        objects: &BTreeMap<(String, String), StoredObject>,
        container: &str,
        name: &str,
    ) -> Result<Bytes, StoreError> {
        let key = (container.to_string(), name.to_string());
        let object = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", container, name)))?;

        let Some(segments) = &object.segments else {
            return Ok(object.data.clone());
        };

        let mut body = BytesMut::new();
        for segment in segments {
            let (c, n) = Self::split_path(&segment.path).ok_or_else(|| {
                StoreError::InvalidResponse(format!("Bad segment path {}", segment.path))
            })?;
            let data = objects
                .get(&(c.clone(), n.clone()))
                .ok_or_else(|| StoreError::NotFound(format!("{}/{}", c, n)))?;
            body.extend_from_slice(&data.data);
        }
        Ok(body.freeze())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        body: Bytes,
        etag: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<PutObjectResponse, StoreError> {
        let _guard = self.enter();
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.ensure_container(container)?;

        let panics = self.panicking_objects.lock().contains(name);
        if panics {
            panic!("injected panic while storing {}/{}", container, name);
        }

        if self.failing_objects.lock().contains(name) {
            return Err(StoreError::Status {
                operation: "PUT",
                path: format!("{}/{}", container, name),
                status: 503,
                message: "Service Unavailable".into(),
            });
        }

        let actual = content_hash(&body);
        if let Some(expected) = etag {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(StoreError::Status {
                    operation: "PUT",
                    path: format!("{}/{}", container, name),
                    status: 422,
                    message: "Unprocessable Entity".into(),
                });
            }
        }

        self.objects.lock().insert(
            (container.to_string(), name.to_string()),
            StoredObject {
                data: body,
                etag: actual.clone(),
                content_type: content_type.map(str::to_string),
                segments: None,
            },
        );
        self.put_count.fetch_add(1, Ordering::SeqCst);

        Ok(PutObjectResponse { etag: Some(actual) })
    }

    async fn put_manifest(
        &self,
        container: &str,
        name: &str,
        manifest: Bytes,
    ) -> Result<PutObjectResponse, StoreError> {
        self.ensure_container(container)?;
        let path = format!("{}/{}", container, name);

        if self.fail_manifest.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                operation: "PUT",
                path,
                status: 500,
                message: "Internal Server Error".into(),
            });
        }

        let bad_request = |message: String| StoreError::Status {
            operation: "PUT",
            path: path.clone(),
            status: 400,
            message,
        };

        let segments: Vec<SegmentRef> = serde_json::from_slice(&manifest)
            .map_err(|e| bad_request(format!("Invalid manifest: {}", e)))?;
        if segments.is_empty() {
            return Err(bad_request("Manifest has no segments".into()));
        }

        let mut objects = self.objects.lock();
        let mut etags = String::new();
        for segment in &segments {
            let (c, n) = Self::split_path(&segment.path)
                .ok_or_else(|| bad_request(format!("Bad segment path {}", segment.path)))?;
            let stored = objects
                .get(&(c, n))
                .ok_or_else(|| bad_request(format!("{} 404 Not Found", segment.path)))?;
            if stored.size() != segment.size_bytes {
                return Err(bad_request(format!("{} Size Mismatch", segment.path)));
            }
            if let Some(ref etag) = segment.etag {
                if !etag.eq_ignore_ascii_case(&stored.etag) {
                    return Err(bad_request(format!("{} Etag Mismatch", segment.path)));
                }
            }
            etags.push_str(&stored.etag);
        }

        // Swift reports an SLO's ETag as the MD5 of its segments' ETags
        let etag = content_hash(etags.as_bytes());
        objects.insert(
            (container.to_string(), name.to_string()),
            StoredObject {
                data: manifest,
                etag: etag.clone(),
                content_type: None,
                segments: Some(segments),
            },
        );
        self.manifest_count.fetch_add(1, Ordering::SeqCst);

        Ok(PutObjectResponse { etag: Some(etag) })
    }

    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectInfo>, StoreError> {
        self.ensure_container(container)?;

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Request("connection reset by peer".into()));
        }

        let objects = self.objects.lock();
        Ok(objects
            .iter()
            .filter(|((c, n), _)| c == container && prefix.map_or(true, |p| n.starts_with(p)))
            .map(|((_, n), o)| ObjectInfo {
                name: n.clone(),
                size: o.size(),
                hash: Some(o.etag.clone()),
                content_type: o.content_type.clone(),
                is_static_large_object: o.segments.is_some(),
            })
            .collect())
    }

    async fn head_object(&self, container: &str, name: &str) -> Result<ObjectInfo, StoreError> {
        self.ensure_container(container)?;
        let objects = self.objects.lock();
        let object = objects
            .get(&(container.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", container, name)))?;

        Ok(ObjectInfo {
            name: name.to_string(),
            size: object.size(),
            hash: Some(object.etag.clone()),
            content_type: object.content_type.clone(),
            is_static_large_object: object.segments.is_some(),
        })
    }

    async fn get_object(&self, container: &str, name: &str) -> Result<Bytes, StoreError> {
        self.ensure_container(container)?;
        let objects = self.objects.lock();
        Self::read(&objects, container, name)
    }

    async fn delete_object(
        &self,
        container: &str,
        name: &str,
        large_object: bool,
    ) -> Result<(), StoreError> {
        self.ensure_container(container)?;
        let mut objects = self.objects.lock();
        let removed = objects
            .remove(&(container.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", container, name)))?;

        if large_object {
            for segment in removed.segments.unwrap_or_default() {
                if let Some(key) = Self::split_path(&segment.path) {
                    objects.remove(&key);
                }
            }
        }

        Ok(())
    }

    async fn copy_object(
        &self,
        container: &str,
        name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), StoreError> {
        self.ensure_container(container)?;
        self.ensure_container(dest_container)?;

        let mut objects = self.objects.lock();
        let data = Self::read(&objects, container, name)?;
        let content_type = objects
            .get(&(container.to_string(), name.to_string()))
            .and_then(|o| o.content_type.clone());
        let etag = content_hash(&data);
        objects.insert(
            (dest_container.to_string(), dest_name.to_string()),
            StoredObject {
                data,
                etag,
                content_type,
                segments: None,
            },
        );

        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, StoreError> {
        let containers = self.containers.lock();
        let objects = self.objects.lock();
        Ok(containers
            .iter()
            .map(|(name, headers)| Self::container_info(&objects, name, headers))
            .collect())
    }

    async fn head_container(&self, container: &str) -> Result<ContainerInfo, StoreError> {
        let containers = self.containers.lock();
        let headers = containers
            .get(container)
            .ok_or_else(|| StoreError::NotFound(container.to_string()))?;
        let objects = self.objects.lock();
        Ok(Self::container_info(&objects, container, headers))
    }

    async fn put_container(
        &self,
        container: &str,
        headers: &[(String, String)],
    ) -> Result<(), StoreError> {
        let mut containers = self.containers.lock();
        let stored = containers.entry(container.to_string()).or_default();
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            match name.strip_prefix("x-remove-container-") {
                Some(removed) => {
                    stored.remove(&format!("x-container-{}", removed));
                }
                None => {
                    stored.insert(name, value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<(), StoreError> {
        let mut containers = self.containers.lock();
        if !containers.contains_key(container) {
            return Err(StoreError::NotFound(container.to_string()));
        }
        let objects = self.objects.lock();
        if objects.keys().any(|(c, _)| c == container) {
            return Err(StoreError::Status {
                operation: "DELETE",
                path: container.to_string(),
                status: 409,
                message: "There was a conflict when trying to complete your request.".into(),
            });
        }
        containers.remove(container);
        Ok(())
    }
}
