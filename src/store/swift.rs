//! OpenStack Swift client
//!
//! Talks to the Swift object API over HTTP using a pre-obtained auth token.
//! Token acquisition and refresh happen outside this crate; the client treats
//! `storage_url` + `auth_token` as an opaque capability.
//!
//! # Tracing
//!
//! Every operation creates a span:
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | PUT object | `swift.put_object` | container, object, bytes, etag, status_code |
//! | PUT manifest | `swift.put_manifest` | container, object, bytes, etag, status_code |
//! | GET container | `swift.list_objects` | container, prefix, count |
//! | HEAD object | `swift.head_object` | container, object, status_code |
//! | GET object | `swift.get_object` | container, object, bytes |
//! | DELETE object | `swift.delete_object` | container, object, large_object, status_code |
//! | PUT copy | `swift.copy_object` | container, object, destination, status_code |
//! | GET account | `swift.list_containers` | count |
//! | HEAD container | `swift.head_container` | container, status_code |
//! | PUT container | `swift.put_container` | container, headers, status_code |
//! | DELETE container | `swift.delete_container` | container, status_code |

use super::{ContainerInfo, ObjectInfo, ObjectStore, PutObjectResponse, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Header carrying the auth token on every request
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Header set by Swift on Static Large Object manifests
pub const STATIC_LARGE_OBJECT_HEADER: &str = "X-Static-Large-Object";

/// Source of a server-side copy, as `/<container>/<object>`
pub const COPY_FROM_HEADER: &str = "X-Copy-From";

const CONTAINER_OBJECT_COUNT_HEADER: &str = "x-container-object-count";
const CONTAINER_BYTES_USED_HEADER: &str = "x-container-bytes-used";

/// Page size for container listings (Swift's server-side maximum)
pub const LISTING_LIMIT: usize = 10_000;

/// Characters escaped in object names; `/` is kept as a pseudo-directory separator
const OBJECT_NAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

const CONTAINER_NAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Swift client configuration
#[derive(Debug, Clone)]
pub struct SwiftClientConfig {
    /// Account storage URL, e.g. `https://swift.example.com/v1/AUTH_abc`
    pub storage_url: String,
    pub auth_token: String,
    /// Per-request timeout; `None` leaves requests unbounded
    pub timeout: Option<Duration>,
}

/// Swift HTTP client
pub struct SwiftClient {
    config: SwiftClientConfig,
    http_client: reqwest::Client,
}

/// One entry of a JSON container listing
#[derive(Debug, Deserialize)]
struct ListingEntry {
    name: String,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

/// One entry of a JSON account listing
#[derive(Debug, Deserialize)]
struct ContainerEntry {
    name: String,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    bytes: u64,
}

impl SwiftClient {
    /// Create a new Swift client
    pub fn new(config: SwiftClientConfig) -> Result<Self, StoreError> {
        Url::parse(&config.storage_url).map_err(|e| {
            StoreError::Config(format!("Invalid storage URL '{}': {}", config.storage_url, e))
        })?;

        if config.auth_token.trim().is_empty() {
            return Err(StoreError::Config("Auth token cannot be empty".into()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the storage URL
    pub fn storage_url(&self) -> &str {
        &self.config.storage_url
    }

    fn base(&self) -> &str {
        self.config.storage_url.trim_end_matches('/')
    }

    fn account_url(&self) -> Result<Url, StoreError> {
        Url::parse(self.base())
            .map_err(|e| StoreError::Config(format!("Invalid URL '{}': {}", self.base(), e)))
    }

    fn container_url(&self, container: &str) -> Result<Url, StoreError> {
        let raw = format!(
            "{}/{}",
            self.base(),
            utf8_percent_encode(container, CONTAINER_NAME_SET)
        );
        Url::parse(&raw).map_err(|e| StoreError::Config(format!("Invalid URL '{}': {}", raw, e)))
    }

    fn object_url(&self, container: &str, name: &str) -> Result<Url, StoreError> {
        let raw = format!(
            "{}/{}/{}",
            self.base(),
            utf8_percent_encode(container, CONTAINER_NAME_SET),
            utf8_percent_encode(name, OBJECT_NAME_SET)
        );
        Url::parse(&raw).map_err(|e| StoreError::Config(format!("Invalid URL '{}': {}", raw, e)))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
        path: String,
    ) -> Result<reqwest::Response, StoreError> {
        let response = request
            .header(AUTH_TOKEN_HEADER, &self.config.auth_token)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path));
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            body.trim().to_string()
        };

        Err(StoreError::Status {
            operation,
            path,
            status: status.as_u16(),
            message,
        })
    }

    /// GET one JSON listing page; `None` when Swift answers 204
    async fn listing_page<T: serde::de::DeserializeOwned>(
        &self,
        mut url: Url,
        path: String,
        prefix: Option<&str>,
        marker: Option<&str>,
    ) -> Result<Option<Vec<T>>, StoreError> {
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("format", "json");
            query.append_pair("limit", &LISTING_LIMIT.to_string());
            if let Some(prefix) = prefix {
                query.append_pair("prefix", prefix);
            }
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }

        let response = self.send(self.http_client.get(url), "GET", path).await?;

        // Older Swift releases answer an empty listing with 204 and no body
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| StoreError::InvalidResponse(format!("Listing: {}", e)))
    }

    async fn put(
        &self,
        url: Url,
        path: String,
        body: Bytes,
        etag: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<PutObjectResponse, StoreError> {
        let mut request = self.http_client.put(url).body(body);
        if let Some(etag) = etag {
            request = request.header(ETAG, etag);
        }
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = self.send(request, "PUT", path).await?;
        let etag = header_etag(response.headers());
        if let Some(ref etag) = etag {
            tracing::Span::current().record("swift.etag", etag.as_str());
        }

        Ok(PutObjectResponse { etag })
    }
}

#[async_trait]
impl ObjectStore for SwiftClient {
    #[tracing::instrument(
        name = "swift.put_object",
        skip(self, body, etag),
        fields(
            swift.container = %container,
            swift.object = %name,
            http.method = "PUT",
            upload.bytes = body.len(),
            swift.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        body: Bytes,
        etag: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<PutObjectResponse, StoreError> {
        let url = self.object_url(container, name)?;
        self.put(url, format!("{}/{}", container, name), body, etag, content_type)
            .await
    }

    #[tracing::instrument(
        name = "swift.put_manifest",
        skip(self, manifest),
        fields(
            swift.container = %container,
            swift.object = %name,
            http.method = "PUT",
            upload.bytes = manifest.len(),
            swift.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn put_manifest(
        &self,
        container: &str,
        name: &str,
        manifest: Bytes,
    ) -> Result<PutObjectResponse, StoreError> {
        let mut url = self.object_url(container, name)?;
        url.query_pairs_mut()
            .append_pair("multipart-manifest", "put");
        self.put(
            url,
            format!("{}/{}", container, name),
            manifest,
            None,
            Some("application/json"),
        )
        .await
    }

    #[tracing::instrument(
        name = "swift.list_objects",
        skip(self),
        fields(
            swift.container = %container,
            http.method = "GET",
            listing.count = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn list_objects(
        &self,
        container: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut objects = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page: Vec<ListingEntry> = match self
                .listing_page(
                    self.container_url(container)?,
                    container.to_string(),
                    prefix,
                    marker.as_deref(),
                )
                .await?
            {
                Some(page) => page,
                None => break,
            };

            let page_len = page.len();
            marker = page.last().map(|entry| entry.name.clone());
            objects.extend(page.into_iter().map(|entry| ObjectInfo {
                name: entry.name,
                size: entry.bytes,
                hash: entry.hash,
                content_type: entry.content_type,
                is_static_large_object: false,
            }));

            if page_len < LISTING_LIMIT {
                break;
            }
        }

        tracing::Span::current().record("listing.count", objects.len());
        tracing::debug!(count = objects.len(), "Listed container objects");

        Ok(objects)
    }

    #[tracing::instrument(
        name = "swift.head_object",
        skip(self),
        fields(
            swift.container = %container,
            swift.object = %name,
            http.method = "HEAD",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn head_object(&self, container: &str, name: &str) -> Result<ObjectInfo, StoreError> {
        let url = self.object_url(container, name)?;
        let response = self
            .send(
                self.http_client.head(url),
                "HEAD",
                format!("{}/{}", container, name),
            )
            .await?;

        let headers = response.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                StoreError::InvalidResponse(format!("Missing Content-Length for {}", name))
            })?;
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_static_large_object = headers
            .get(STATIC_LARGE_OBJECT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(ObjectInfo {
            name: name.to_string(),
            size,
            hash: header_etag(headers),
            content_type,
            is_static_large_object,
        })
    }

    #[tracing::instrument(
        name = "swift.get_object",
        skip(self),
        fields(
            swift.container = %container,
            swift.object = %name,
            http.method = "GET",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn get_object(&self, container: &str, name: &str) -> Result<Bytes, StoreError> {
        let url = self.object_url(container, name)?;
        let response = self
            .send(
                self.http_client.get(url),
                "GET",
                format!("{}/{}", container, name),
            )
            .await?;

        response
            .bytes()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))
    }

    #[tracing::instrument(
        name = "swift.delete_object",
        skip(self),
        fields(
            swift.container = %container,
            swift.object = %name,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn delete_object(
        &self,
        container: &str,
        name: &str,
        large_object: bool,
    ) -> Result<(), StoreError> {
        let mut url = self.object_url(container, name)?;
        if large_object {
            url.query_pairs_mut()
                .append_pair("multipart-manifest", "delete");
        }

        self.send(
            self.http_client.delete(url),
            "DELETE",
            format!("{}/{}", container, name),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "swift.copy_object",
        skip(self),
        fields(
            swift.container = %container,
            swift.object = %name,
            swift.destination_container = %dest_container,
            swift.destination_object = %dest_name,
            http.method = "PUT",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn copy_object(
        &self,
        container: &str,
        name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), StoreError> {
        let url = self.object_url(dest_container, dest_name)?;
        let copy_from = format!(
            "/{}/{}",
            utf8_percent_encode(container, CONTAINER_NAME_SET),
            utf8_percent_encode(name, OBJECT_NAME_SET)
        );
        let request = self
            .http_client
            .put(url)
            .header(COPY_FROM_HEADER, copy_from)
            .body(Bytes::new());

        self.send(request, "PUT", format!("{}/{}", dest_container, dest_name))
            .await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "swift.list_containers",
        skip(self),
        fields(
            http.method = "GET",
            listing.count = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, StoreError> {
        let mut containers = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page: Vec<ContainerEntry> = match self
                .listing_page(self.account_url()?, "account".to_string(), None, marker.as_deref())
                .await?
            {
                Some(page) => page,
                None => break,
            };

            let page_len = page.len();
            marker = page.last().map(|entry| entry.name.clone());
            containers.extend(page.into_iter().map(|entry| ContainerInfo {
                name: entry.name,
                object_count: entry.count,
                bytes_used: entry.bytes,
                headers: BTreeMap::new(),
            }));

            if page_len < LISTING_LIMIT {
                break;
            }
        }

        tracing::Span::current().record("listing.count", containers.len());
        Ok(containers)
    }

    #[tracing::instrument(
        name = "swift.head_container",
        skip(self),
        fields(
            swift.container = %container,
            http.method = "HEAD",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn head_container(&self, container: &str) -> Result<ContainerInfo, StoreError> {
        let url = self.container_url(container)?;
        let response = self
            .send(self.http_client.head(url), "HEAD", container.to_string())
            .await?;

        let headers = response.headers();
        let counter = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };

        Ok(ContainerInfo {
            name: container.to_string(),
            object_count: counter(CONTAINER_OBJECT_COUNT_HEADER),
            bytes_used: counter(CONTAINER_BYTES_USED_HEADER),
            headers: container_headers(headers),
        })
    }

    #[tracing::instrument(
        name = "swift.put_container",
        skip(self),
        fields(
            swift.container = %container,
            http.method = "PUT",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn put_container(
        &self,
        container: &str,
        headers: &[(String, String)],
    ) -> Result<(), StoreError> {
        let url = self.container_url(container)?;
        let mut request = self.http_client.put(url).body(Bytes::new());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| StoreError::Config(format!("Invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value.trim()).map_err(|e| {
                StoreError::Config(format!("Invalid value for header {}: {}", name, e))
            })?;
            request = request.header(name, value);
        }

        self.send(request, "PUT", container.to_string()).await?;
        Ok(())
    }

    #[tracing::instrument(
        name = "swift.delete_container",
        skip(self),
        fields(
            swift.container = %container,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn delete_container(&self, container: &str) -> Result<(), StoreError> {
        let url = self.container_url(container)?;
        self.send(self.http_client.delete(url), "DELETE", container.to_string())
            .await?;
        Ok(())
    }
}

/// `X-Container-*` ACL and metadata headers, without the usage counters
fn container_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name.starts_with("x-container-")
                && name != CONTAINER_OBJECT_COUNT_HEADER
                && name != CONTAINER_BYTES_USED_HEADER
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// ETag header value without surrounding quotes (SLO manifests return a quoted ETag)
fn header_etag(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(storage_url: &str) -> SwiftClient {
        SwiftClient::new(SwiftClientConfig {
            storage_url: storage_url.into(),
            auth_token: "token".into(),
            timeout: None,
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_storage_url() {
        let result = SwiftClient::new(SwiftClientConfig {
            storage_url: "not a url".into(),
            auth_token: "token".into(),
            timeout: None,
        });
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_rejects_empty_token() {
        let result = SwiftClient::new(SwiftClientConfig {
            storage_url: "https://swift.example.com/v1/AUTH_test".into(),
            auth_token: "  ".into(),
            timeout: None,
        });
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_object_url_keeps_pseudo_directories() {
        let client = client("https://swift.example.com/v1/AUTH_test/");
        let url = client.object_url("backups", "2024/disk image.iso").unwrap();
        assert_eq!(
            url.as_str(),
            "https://swift.example.com/v1/AUTH_test/backups/2024/disk%20image.iso"
        );
    }

    #[test]
    fn test_container_url_escapes_slash() {
        let client = client("https://swift.example.com/v1/AUTH_test");
        let url = client.container_url("a/b").unwrap();
        assert_eq!(url.as_str(), "https://swift.example.com/v1/AUTH_test/a%2Fb");
    }

    #[test]
    fn test_container_headers_skip_counters() {
        let mut headers = HeaderMap::new();
        headers.insert("x-container-object-count", "3".parse().unwrap());
        headers.insert("x-container-bytes-used", "42".parse().unwrap());
        headers.insert("x-container-read", ".r:*,.rlistings".parse().unwrap());
        headers.insert("x-timestamp", "1700000000.00000".parse().unwrap());

        let collected = container_headers(&headers);
        assert_eq!(collected.len(), 1);
        assert_eq!(collected["x-container-read"], ".r:*,.rlistings");
    }

    #[test]
    fn test_header_etag_strips_quotes() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, "\"d41d8cd98f00b204e9800998ecf8427e\"".parse().unwrap());
        assert_eq!(
            header_etag(&headers).as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
    }
}
