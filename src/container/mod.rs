//! Container operations
//!
//! Listing, inspection, creation, header updates and deletion of containers.
//! Headers are given on the command line as `Header-Name:value`; the value
//! may itself contain colons (`X-Container-Read:.r:*`).

use crate::metrics;
use crate::store::{ContainerInfo, ObjectStore, StoreError};
use thiserror::Error;
use tracing::{info, instrument};

/// Header pair granting anonymous read and listing access
pub const GLOBAL_READ_HEADER: (&str, &str) = ("X-Container-Read", ".r:*,.rlistings");

/// Header pair removing every read ACL
pub const REMOVE_READ_HEADER: (&str, &str) = ("X-Remove-Container-Read", "x");

/// Container operation errors
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Unable to parse header '{0}' (must use format header-name:header-value)")]
    InvalidHeader(String),

    #[error("Container {0} does not exist")]
    Missing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn record<T, E>(operation: &str, result: &Result<T, E>) {
    metrics::record_container_operation(operation, result.is_ok());
}

/// Parse a `name:value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String), ContainerError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| ContainerError::InvalidHeader(raw.to_string()))?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(ContainerError::InvalidHeader(raw.to_string()));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>, ContainerError> {
    raw.iter().map(String::as_str).map(parse_header).collect()
}

/// Names of every container in the account
#[instrument(skip(store), err)]
pub async fn show_containers(store: &dyn ObjectStore) -> Result<Vec<String>, ContainerError> {
    let result = store
        .list_containers()
        .await
        .map(|containers| containers.into_iter().map(|c| c.name).collect())
        .map_err(ContainerError::from);
    record("list", &result);
    result
}

/// Object count, bytes used and ACL/metadata headers of one container
#[instrument(skip(store), err)]
pub async fn container_info(
    store: &dyn ObjectStore,
    container: &str,
) -> Result<ContainerInfo, ContainerError> {
    let result = store
        .head_container(container)
        .await
        .map_err(ContainerError::from);
    record("head", &result);
    result
}

/// Create a container with optional `name:value` headers
#[instrument(skip(store), err)]
pub async fn make_container(
    store: &dyn ObjectStore,
    container: &str,
    headers: &[String],
) -> Result<(), ContainerError> {
    let result = match parse_headers(headers) {
        Ok(parsed) => store
            .put_container(container, &parsed)
            .await
            .map_err(ContainerError::from),
        Err(e) => Err(e),
    };
    record("create", &result);
    if result.is_ok() {
        info!(headers = headers.len(), "Container created");
    }
    result
}

/// Set or remove headers on an existing container
#[instrument(skip(store), err)]
pub async fn update_container(
    store: &dyn ObjectStore,
    container: &str,
    headers: &[String],
) -> Result<(), ContainerError> {
    let result = apply_update(store, container, headers).await;
    record("update", &result);
    result
}

async fn apply_update(
    store: &dyn ObjectStore,
    container: &str,
    headers: &[String],
) -> Result<(), ContainerError> {
    let parsed = parse_headers(headers)?;
    match store.head_container(container).await {
        Ok(_) => {}
        Err(StoreError::NotFound(_)) => return Err(ContainerError::Missing(container.to_string())),
        Err(e) => return Err(e.into()),
    }
    store.put_container(container, &parsed).await?;
    Ok(())
}

/// Delete a container; with `force` every object in it is deleted first
#[instrument(skip(store), err)]
pub async fn delete_container(
    store: &dyn ObjectStore,
    container: &str,
    force: bool,
) -> Result<(), ContainerError> {
    let result = remove(store, container, force).await;
    record("delete", &result);
    result
}

async fn remove(store: &dyn ObjectStore, container: &str, force: bool) -> Result<(), ContainerError> {
    if force {
        let objects = store.list_objects(container, None).await?;
        for object in &objects {
            match store.delete_object(container, &object.name, false).await {
                // A segment may already be gone along with its manifest
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(objects = objects.len(), "Emptied container");
    }

    store.delete_container(container).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use bytes::Bytes;

    #[test]
    fn test_parse_header_keeps_colons_in_value() {
        assert_eq!(
            parse_header("X-Container-Read:.r:*").unwrap(),
            ("X-Container-Read".to_string(), ".r:*".to_string())
        );
        assert_eq!(
            parse_header(" X-Container-Meta-Owner : ops ").unwrap(),
            ("X-Container-Meta-Owner".to_string(), "ops".to_string())
        );
    }

    #[test]
    fn test_parse_header_rejects_malformed() {
        for raw in ["no-separator", ":value", "bad name:value"] {
            assert!(matches!(
                parse_header(raw),
                Err(ContainerError::InvalidHeader(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_make_and_inspect_container() {
        let store = MemoryStore::new();
        make_container(
            &store,
            "public",
            &[format!("{}:{}", GLOBAL_READ_HEADER.0, GLOBAL_READ_HEADER.1)],
        )
        .await
        .unwrap();
        store
            .put_object("public", "a", Bytes::from("abc"), None, None)
            .await
            .unwrap();

        let info = container_info(&store, "public").await.unwrap();
        assert_eq!(info.object_count, 1);
        assert_eq!(info.bytes_used, 3);
        assert_eq!(
            info.headers.get("x-container-read").map(String::as_str),
            Some(".r:*,.rlistings")
        );
        assert_eq!(show_containers(&store).await.unwrap(), vec!["public"]);
    }

    #[tokio::test]
    async fn test_make_container_with_bad_header_creates_nothing() {
        let store = MemoryStore::new();
        let err = make_container(&store, "c", &["oops".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::InvalidHeader(_)));
        assert!(show_containers(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_removes_read_acl() {
        let store = MemoryStore::new();
        make_container(&store, "c", &["X-Container-Read:.r:*".to_string()])
            .await
            .unwrap();

        update_container(
            &store,
            "c",
            &[format!("{}:{}", REMOVE_READ_HEADER.0, REMOVE_READ_HEADER.1)],
        )
        .await
        .unwrap();

        let info = container_info(&store, "c").await.unwrap();
        assert!(!info.headers.contains_key("x-container-read"));
    }

    #[tokio::test]
    async fn test_update_missing_container() {
        let store = MemoryStore::new();
        let err = update_container(&store, "nope", &["X-Container-Meta-A:b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::Missing(_)));
        assert!(show_containers(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_non_empty_container_needs_force() {
        let store = MemoryStore::new();
        store.create_container("c");
        for name in ["a", "b"] {
            store
                .put_object("c", name, Bytes::from("x"), None, None)
                .await
                .unwrap();
        }

        let err = delete_container(&store, "c", false).await.unwrap_err();
        assert!(matches!(
            err,
            ContainerError::Store(StoreError::Status { status: 409, .. })
        ));

        delete_container(&store, "c", true).await.unwrap();
        assert!(show_containers(&store).await.unwrap().is_empty());
    }
}
