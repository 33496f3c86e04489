//! Object storage backend
//!
//! The upload engine never talks to a concrete SDK. Everything it needs from
//! the backend goes through the narrow [`ObjectStore`] capability trait, which
//! is injected as `Arc<dyn ObjectStore>`.
//!
//! # Implementations
//!
//! - [`SwiftClient`] - OpenStack Swift HTTP API (token authenticated)
//! - [`MemoryStore`] - In-memory backend with latency and failure injection
//!
//! # Example
//!
//! ```no_run
//! use large_objects::store::{ObjectStore, SwiftClient, SwiftClientConfig};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SwiftClient::new(SwiftClientConfig {
//!     storage_url: "https://swift.example.com/v1/AUTH_test".to_string(),
//!     auth_token: "token".to_string(),
//!     timeout: None,
//! })?;
//!
//! let response = client
//!     .put_object("backups", "hello.txt", Bytes::from("Hello"), None, Some("text/plain"))
//!     .await?;
//! println!("ETag: {:?}", response.etag);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod memory;
pub mod swift;

pub use memory::MemoryStore;
pub use swift::{SwiftClient, SwiftClientConfig};

/// Storage backend errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("{operation} {path} failed with status {status}: {message}")]
    Status {
        operation: &'static str,
        path: String,
        status: u16,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Short label used for error metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Config(_) => "config",
            StoreError::Request(_) => "request",
            StoreError::Status { .. } => "status",
            StoreError::NotFound(_) => "not_found",
            StoreError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Content hash the backend uses as ETag (lowercase hex MD5)
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Listing / metadata entry for a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    /// MD5 hex digest as reported by the backend, if any
    pub hash: Option<String>,
    pub content_type: Option<String>,
    /// True when the object is a Static Large Object manifest
    pub is_static_large_object: bool,
}

/// Account listing / metadata entry for a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub object_count: u64,
    pub bytes_used: u64,
    /// ACL and metadata headers (`X-Container-Read`, `X-Container-Meta-*`, ...), lowercased
    pub headers: BTreeMap<String, String>,
}

/// Response to an object or manifest PUT
#[derive(Debug, Clone)]
pub struct PutObjectResponse {
    pub etag: Option<String>,
}

/// Capability set the upload engine needs from an object storage backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or overwrite an object.
    ///
    /// When `etag` is given the backend must reject the body if its MD5 does
    /// not match.
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        body: Bytes,
        etag: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<PutObjectResponse, StoreError>;

    /// Upload a Static Large Object manifest (JSON segment list).
    async fn put_manifest(
        &self,
        container: &str,
        name: &str,
        manifest: Bytes,
    ) -> Result<PutObjectResponse, StoreError>;

    /// List objects in a container, optionally restricted to a name prefix.
    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Fetch object metadata.
    async fn head_object(&self, container: &str, name: &str) -> Result<ObjectInfo, StoreError>;

    /// Fetch object content. Large objects are served as their concatenated segments.
    async fn get_object(&self, container: &str, name: &str) -> Result<Bytes, StoreError>;

    /// Delete an object. With `large_object` set, a manifest is deleted together
    /// with every segment it references.
    async fn delete_object(
        &self,
        container: &str,
        name: &str,
        large_object: bool,
    ) -> Result<(), StoreError>;

    /// Server-side copy of `container/name` to `dest_container/dest_name`.
    async fn copy_object(
        &self,
        container: &str,
        name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), StoreError>;

    /// List every container in the account.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, StoreError>;

    /// Fetch container metadata.
    async fn head_container(&self, container: &str) -> Result<ContainerInfo, StoreError>;

    /// Create a container, or update its headers if it already exists.
    async fn put_container(
        &self,
        container: &str,
        headers: &[(String, String)],
    ) -> Result<(), StoreError>;

    /// Delete an empty container. A non-empty container fails with status 409.
    async fn delete_container(&self, container: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_md5_hex() {
        assert_eq!(content_hash(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(StoreError::Request("boom".into()).kind(), "request");
        assert_eq!(StoreError::NotFound("c/o".into()).kind(), "not_found");
        let status = StoreError::Status {
            operation: "PUT",
            path: "c/o".into(),
            status: 422,
            message: "Unprocessable Entity".into(),
        };
        assert_eq!(status.kind(), "status");
        assert_eq!(
            status.to_string(),
            "PUT c/o failed with status 422: Unprocessable Entity"
        );
    }
}
