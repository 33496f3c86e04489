//! Plain object operations
//!
//! Single-object upload, download, copy, rename, delete, listing and info
//! lookups. Files above [`MAX_OBJECT_SIZE`] have to go through the SLO engine
//! instead.
//!
//! # Example
//!
//! ```no_run
//! use large_objects::object::put_object;
//! use large_objects::store::{SwiftClient, SwiftClientConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SwiftClient::new(SwiftClientConfig {
//!     storage_url: "https://swift.example.com/v1/AUTH_abc".to_string(),
//!     auth_token: "token".to_string(),
//!     timeout: None,
//! })?;
//!
//! let result = put_object(&client, "backups", "notes.txt", Path::new("notes.txt")).await?;
//! println!("Uploaded with ETag: {:?}", result.etag);
//! # Ok(())
//! # }
//! ```

use crate::metrics;
use crate::store::{content_hash, ObjectInfo, ObjectStore, PutObjectResponse, StoreError};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

/// Largest object the backend accepts in a single PUT (5 GB)
pub const MAX_OBJECT_SIZE: u64 = 5 * 1000 * 1000 * 1000;

/// Object operation errors
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("Failed to read source file {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is too large to upload as a single object ({size} bytes, max {max})")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn record<T, E>(operation: &str, result: &Result<T, E>) {
    metrics::record_object_operation(operation, result.is_ok());
}

/// Upload a local file as one object, with its MD5 as the ETag
#[instrument(skip(store, path), fields(path = %path.display()), err)]
pub async fn put_object(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    path: &Path,
) -> Result<PutObjectResponse, ObjectError> {
    let result = upload_file(store, container, name, path).await;
    record("put", &result);
    result
}

async fn upload_file(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    path: &Path,
) -> Result<PutObjectResponse, ObjectError> {
    let source_error = |source| ObjectError::Source {
        path: path.to_path_buf(),
        source,
    };

    let size = tokio::fs::metadata(path).await.map_err(source_error)?.len();
    if size > MAX_OBJECT_SIZE {
        return Err(ObjectError::TooLarge {
            path: path.to_path_buf(),
            size,
            max: MAX_OBJECT_SIZE,
        });
    }

    let data = Bytes::from(tokio::fs::read(path).await.map_err(source_error)?);
    let hash = content_hash(&data);
    let response = store
        .put_object(container, name, data, Some(&hash), None)
        .await?;

    info!(bytes = size, etag = %hash, "Object uploaded");
    Ok(response)
}

/// Delete an object; with `large_object` an SLO is removed together with its segments
#[instrument(skip(store), err)]
pub async fn delete_object(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    large_object: bool,
) -> Result<(), ObjectError> {
    let result = store
        .delete_object(container, name, large_object)
        .await
        .map_err(ObjectError::from);
    record("delete", &result);
    result
}

/// Download an object into `destination`, returning the bytes written
///
/// Large objects arrive as the concatenation of their segments.
#[instrument(skip(store, destination), fields(destination = %destination.display()), err)]
pub async fn get_object(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    destination: &Path,
) -> Result<u64, ObjectError> {
    let result = download(store, container, name, destination).await;
    record("get", &result);
    result
}

async fn download(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    destination: &Path,
) -> Result<u64, ObjectError> {
    let data = store.get_object(container, name).await?;
    tokio::fs::write(destination, &data)
        .await
        .map_err(|source| ObjectError::Destination {
            path: destination.to_path_buf(),
            source,
        })?;

    info!(bytes = data.len(), "Object downloaded");
    Ok(data.len() as u64)
}

/// Server-side copy of an object, possibly into another container
#[instrument(skip(store), err)]
pub async fn copy_object(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    dest_container: &str,
    dest_name: &str,
) -> Result<(), ObjectError> {
    let result = store
        .copy_object(container, name, dest_container, dest_name)
        .await
        .map_err(ObjectError::from);
    record("copy", &result);
    result
}

/// Rename an object within its container
///
/// Swift has no rename: the object is copied under the new name and the old
/// one deleted. A large object is copied as a plain object (so it must fit
/// [`MAX_OBJECT_SIZE`]) and its old segments are deleted with the manifest.
#[instrument(skip(store), err)]
pub async fn rename_object(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    new_name: &str,
) -> Result<(), ObjectError> {
    let result = rename(store, container, name, new_name).await;
    record("rename", &result);
    result
}

async fn rename(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
    new_name: &str,
) -> Result<(), ObjectError> {
    let source = store.head_object(container, name).await?;
    store
        .copy_object(container, name, container, new_name)
        .await?;
    store
        .delete_object(container, name, source.is_static_large_object)
        .await?;
    Ok(())
}

/// Names of all objects in `container`
#[instrument(skip(store), err)]
pub async fn show_objects(
    store: &dyn ObjectStore,
    container: &str,
) -> Result<Vec<String>, ObjectError> {
    let result = store
        .list_objects(container, None)
        .await
        .map(|objects| objects.into_iter().map(|o| o.name).collect())
        .map_err(ObjectError::from);
    record("list", &result);
    result
}

/// Size, ETag and SLO flag of one object
#[instrument(skip(store), err)]
pub async fn object_info(
    store: &dyn ObjectStore,
    container: &str,
    name: &str,
) -> Result<ObjectInfo, ObjectError> {
    let result = store
        .head_object(container, name)
        .await
        .map_err(ObjectError::from);
    record("head", &result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Write;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_container("c");
        store
    }

    #[tokio::test]
    async fn test_put_object_round_trip() {
        let store = store();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"small object").unwrap();
        file.flush().unwrap();

        let response = put_object(&store, "c", "small", file.path()).await.unwrap();
        assert_eq!(response.etag, Some(content_hash(b"small object")));

        let info = object_info(&store, "c", "small").await.unwrap();
        assert_eq!(info.size, 12);
        assert!(!info.is_static_large_object);
        assert_eq!(show_objects(&store, "c").await.unwrap(), vec!["small"]);
    }

    #[tokio::test]
    async fn test_put_object_missing_source() {
        let store = store();
        let dir = tempfile::tempdir().unwrap();
        let err = put_object(&store, "c", "x", &dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::Source { .. }));
    }

    #[tokio::test]
    async fn test_get_object_writes_large_object_content() {
        let store = store();
        store
            .put_object("c", "o-chunk-0000", Bytes::from("hello "), None, None)
            .await
            .unwrap();
        store
            .put_object("c", "o-chunk-0001", Bytes::from("world"), None, None)
            .await
            .unwrap();
        store
            .put_manifest(
                "c",
                "o",
                Bytes::from(
                    r#"[{"path":"/c/o-chunk-0000","size_bytes":6},{"path":"/c/o-chunk-0001","size_bytes":5}]"#,
                ),
            )
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("o");
        let written = get_object(&store, "c", "o", &destination).await.unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&destination).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_get_object_bad_destination() {
        let store = store();
        store
            .put_object("c", "o", Bytes::from("x"), None, None)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = get_object(&store, "c", "o", &dir.path().join("missing/dir/o"))
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::Destination { .. }));
    }

    #[tokio::test]
    async fn test_copy_object_to_other_container() {
        let store = store();
        store.create_container("archive");
        store
            .put_object("c", "o", Bytes::from("data"), None, None)
            .await
            .unwrap();

        copy_object(&store, "c", "o", "archive", "o").await.unwrap();

        assert_eq!(store.get_object("archive", "o").await.unwrap(), Bytes::from("data"));
        assert_eq!(store.object_count("c"), 1);
    }

    #[tokio::test]
    async fn test_rename_object() {
        let store = store();
        store
            .put_object("c", "old", Bytes::from("data"), None, None)
            .await
            .unwrap();

        rename_object(&store, "c", "old", "new").await.unwrap();

        assert_eq!(show_objects(&store, "c").await.unwrap(), vec!["new"]);
        assert_eq!(store.get_object("c", "new").await.unwrap(), Bytes::from("data"));
    }

    #[tokio::test]
    async fn test_rename_large_object_drops_old_segments() {
        let store = store();
        store
            .put_object("c", "o-chunk-0000", Bytes::from("abc"), None, None)
            .await
            .unwrap();
        store
            .put_manifest(
                "c",
                "o",
                Bytes::from(r#"[{"path":"/c/o-chunk-0000","size_bytes":3}]"#),
            )
            .await
            .unwrap();

        rename_object(&store, "c", "o", "renamed").await.unwrap();

        assert_eq!(show_objects(&store, "c").await.unwrap(), vec!["renamed"]);
        let info = object_info(&store, "c", "renamed").await.unwrap();
        assert_eq!(info.size, 3);
        assert!(!info.is_static_large_object);
    }

    #[tokio::test]
    async fn test_rename_missing_object_keeps_container_untouched() {
        let store = store();
        let err = rename_object(&store, "c", "missing", "new")
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::Store(StoreError::NotFound(_))));
        assert_eq!(store.object_count("c"), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_object() {
        let store = store();
        let err = delete_object(&store, "c", "missing", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectError::Store(StoreError::NotFound(_))));
    }
}
