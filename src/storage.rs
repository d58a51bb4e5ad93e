//! Blob storage: fetch the input document, persist the artifacts.
//!
//! Objects are addressed by `scheme://bucket/key` URIs. Three stores ship
//! with the crate:
//!
//! | Scheme | Store | Use |
//! |---|---|---|
//! | `gs://` | [`GcsBlobStore`] | Cloud Storage JSON API over HTTP |
//! | `file://` | [`LocalBlobStore`] | `<root>/<bucket>/<key>`, atomic writes |
//! | `mem://` | [`MemoryBlobStore`] | tests and embedding; opt-in |
//!
//! [`StoreRouter`] dispatches on the scheme so one pipeline can read from
//! one store and write to another.

use crate::config::StorageConfig;
use crate::error::FinExtractError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CSV: &str = "text/csv";

// ── URIs ─────────────────────────────────────────────────────────────────────

/// A parsed `scheme://bucket/key` URI. `key` never starts or ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobUri {
    pub scheme: String,
    pub bucket: String,
    pub key: String,
}

impl BlobUri {
    /// Parse an object URI; the key must be non-empty.
    pub fn parse(uri: &str) -> Result<Self, FinExtractError> {
        let parsed = Self::parse_prefix(uri)?;
        if parsed.key.is_empty() {
            return Err(FinExtractError::InvalidBlobUri { uri: uri.to_string() });
        }
        Ok(parsed)
    }

    /// Parse a location prefix; the key may be empty (`gs://bucket`).
    pub fn parse_prefix(uri: &str) -> Result<Self, FinExtractError> {
        let invalid = || FinExtractError::InvalidBlobUri { uri: uri.to_string() };

        let (scheme, rest) = uri.split_once("://").ok_or_else(invalid)?;
        let scheme_ok = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '+' || c == '-');
        if !scheme_ok {
            return Err(invalid());
        }

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.trim_matches('/').to_string(),
        })
    }

    /// Last key segment without its extension: `gs://b/in/report.v2.pdf` → `report.v2`.
    pub fn basename(&self) -> &str {
        let file = self.key.rsplit('/').next().unwrap_or(&self.key);
        match file.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file,
        }
    }

    /// The object `name` under this prefix.
    pub fn child(&self, name: &str) -> BlobUri {
        let key = if self.key.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.key, name)
        };
        BlobUri {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            key,
        }
    }
}

impl fmt::Display for BlobUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}://{}", self.scheme, self.bucket)
        } else {
            write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
        }
    }
}

impl std::str::FromStr for BlobUri {
    type Err = FinExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn storage_failure(uri: &BlobUri, reason: impl fmt::Display) -> FinExtractError {
    FinExtractError::StorageFailure {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

// ── Trait ────────────────────────────────────────────────────────────────────

/// Key/value byte store addressed by [`BlobUri`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, uri: &BlobUri) -> Result<Vec<u8>, FinExtractError>;

    /// Store `bytes` at `uri` and return the URI it is reachable at.
    async fn put(
        &self,
        bytes: Vec<u8>,
        uri: &BlobUri,
        content_type: &str,
    ) -> Result<BlobUri, FinExtractError>;
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Dispatches to a store per URI scheme.
#[derive(Clone, Default)]
pub struct StoreRouter {
    stores: HashMap<String, Arc<dyn BlobStore>>,
}

impl StoreRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production stores: `gs://` always, `file://` when a local root is
    /// set, `mem://` only when `memory_store` is enabled.
    pub fn from_config(client: Client, storage: StorageConfig) -> Self {
        let mut router = Self::new().with_store(
            "gs",
            Arc::new(GcsBlobStore::new(
                client,
                storage.gcs_endpoint,
                storage.gcs_access_token,
            )),
        );
        if let Some(root) = storage.local_root {
            router = router.with_store("file", Arc::new(LocalBlobStore::new(root)));
        }
        if storage.memory_store {
            router = router.with_store("mem", Arc::new(MemoryBlobStore::new()));
        }
        router
    }

    pub fn with_store(mut self, scheme: impl Into<String>, store: Arc<dyn BlobStore>) -> Self {
        self.stores.insert(scheme.into(), store);
        self
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    fn store_for(&self, uri: &BlobUri) -> Result<&Arc<dyn BlobStore>, FinExtractError> {
        self.stores.get(&uri.scheme).ok_or_else(|| {
            FinExtractError::InvalidRequest(format!(
                "unsupported storage scheme '{}://' (configured: {})",
                uri.scheme,
                self.schemes().join(", ")
            ))
        })
    }
}

#[async_trait]
impl BlobStore for StoreRouter {
    async fn get(&self, uri: &BlobUri) -> Result<Vec<u8>, FinExtractError> {
        self.store_for(uri)?.get(uri).await
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        uri: &BlobUri,
        content_type: &str,
    ) -> Result<BlobUri, FinExtractError> {
        self.store_for(uri)?.put(bytes, uri, content_type).await
    }
}

// ── Cloud Storage ────────────────────────────────────────────────────────────

const GCS_DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Cloud Storage via the JSON API.
#[derive(Clone)]
pub struct GcsBlobStore {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
}

impl GcsBlobStore {
    pub fn new(client: Client, endpoint: Option<String>, access_token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint
                .unwrap_or_else(|| GCS_DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_token,
        }
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{key}?alt=media`, key percent-encoded.
    pub fn download_url(&self, uri: &BlobUri) -> Result<Url, FinExtractError> {
        let mut url = self.parse_endpoint(uri)?;
        url.path_segments_mut()
            .map_err(|_| storage_failure(uri, "endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", uri.bucket.as_str(), "o", uri.key.as_str()]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    /// `{endpoint}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}`.
    pub fn upload_url(&self, uri: &BlobUri) -> Result<Url, FinExtractError> {
        let mut url = self.parse_endpoint(uri)?;
        url.path_segments_mut()
            .map_err(|_| storage_failure(uri, "endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", uri.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &uri.key);
        Ok(url)
    }

    fn parse_endpoint(&self, uri: &BlobUri) -> Result<Url, FinExtractError> {
        Url::parse(&self.endpoint).map_err(|e| storage_failure(uri, format!("bad endpoint: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn check_status(uri: &BlobUri, response: reqwest::Response) -> Result<reqwest::Response, FinExtractError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = match status {
        StatusCode::NOT_FOUND => "object not found".to_string(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!("access denied (HTTP {status})"),
        _ => format!("HTTP {status}: {}", body.trim()),
    };
    Err(storage_failure(uri, reason))
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn get(&self, uri: &BlobUri) -> Result<Vec<u8>, FinExtractError> {
        let url = self.download_url(uri)?;
        debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| storage_failure(uri, e))?;
        let bytes = check_status(uri, response)
            .await?
            .bytes()
            .await
            .map_err(|e| storage_failure(uri, e))?;
        info!("Downloaded {} ({} bytes)", uri, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        uri: &BlobUri,
        content_type: &str,
    ) -> Result<BlobUri, FinExtractError> {
        let url = self.upload_url(uri)?;
        let len = bytes.len();
        let response = self
            .authorize(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| storage_failure(uri, e))?;
        check_status(uri, response).await?;
        info!("Uploaded {} ({} bytes, {})", uri, len, content_type);
        Ok(uri.clone())
    }
}

// ── Local filesystem ─────────────────────────────────────────────────────────

/// `file://bucket/key` mapped to `<root>/bucket/key`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a URI below the root, rejecting keys that would escape it.
    pub fn path_for(&self, uri: &BlobUri) -> Result<PathBuf, FinExtractError> {
        let relative = Path::new(&uri.bucket).join(&uri.key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FinExtractError::InvalidBlobUri { uri: uri.to_string() });
        }
        Ok(self.root.join(relative))
    }
}

/// Write via a temp file in the target directory, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FinExtractError> {
    let write_failed = |source: std::io::Error| FinExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_failed)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_failed)?;
    tmp.write_all(bytes).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, uri: &BlobUri) -> Result<Vec<u8>, FinExtractError> {
        let path = self.path_for(uri)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| storage_failure(uri, format!("{}: {e}", path.display())))
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        uri: &BlobUri,
        _content_type: &str,
    ) -> Result<BlobUri, FinExtractError> {
        let path = self.path_for(uri)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| FinExtractError::Internal(format!("Write task panicked: {e}")))?
            .map_err(|e| storage_failure(uri, e))?;
        debug!("Wrote {}", path.display());
        Ok(uri.clone())
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// An object held by [`MemoryBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Process-local store keyed by the full URI string.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str, bytes: impl Into<Vec<u8>>, content_type: &str) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                uri.to_string(),
                StoredObject {
                    bytes: bytes.into(),
                    content_type: content_type.to_string(),
                },
            );
        }
    }

    pub fn object(&self, uri: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, uri: &BlobUri) -> Result<Vec<u8>, FinExtractError> {
        self.object(&uri.to_string())
            .map(|o| o.bytes)
            .ok_or_else(|| storage_failure(uri, "object not found"))
    }

    async fn put(
        &self,
        bytes: Vec<u8>,
        uri: &BlobUri,
        content_type: &str,
    ) -> Result<BlobUri, FinExtractError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| storage_failure(uri, "store lock poisoned"))?;
        objects.insert(
            uri.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(uri.clone())
    }
}
