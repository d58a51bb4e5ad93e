//! Configuration types for financial-statement extraction.
//!
//! Pipeline behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The external clients are described separately
//! by [`DocumentAiConfig`] and [`StorageConfig`] because they are built once
//! at startup and shared across requests, while a `PipelineConfig` is cheap to
//! clone per run.

use crate::error::FinExtractError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Default page limit per extraction call.
pub const DEFAULT_PAGES_PER_CHUNK: usize = 15;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use fin_extract::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .pages_per_chunk(10)
///     .max_retries(3)
///     .output_location("gs://reports-out/extracted")
///     .build()
///     .unwrap();
/// assert_eq!(config.pages_per_chunk, 10);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum pages per chunk sent to the engine. Default: 15.
    ///
    /// Synchronous Document AI processing rejects documents above a processor
    /// specific page limit; 15 fits the form parser and custom extractors.
    pub pages_per_chunk: usize,

    /// Engine calls allowed in flight at once. Default: 1.
    ///
    /// Results are re-sorted into chunk order before merging, so raising this
    /// only changes wall-clock time.
    pub concurrency: usize,

    /// Retries after a transient engine failure or timeout. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call engine timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Where artifacts are written, as a blob URI prefix such as
    /// `gs://bucket/prefix`. Default: None (the caller must set it for
    /// [`crate::Pipeline::process_uri`]).
    pub output_location: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Path to the pdfium shared library, or a directory holding it.
    /// Default: None (system library).
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pages_per_chunk: DEFAULT_PAGES_PER_CHUNK,
            concurrency: 1,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            output_location: None,
            password: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("pages_per_chunk", &self.pages_per_chunk)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("output_location", &self.output_location)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn pages_per_chunk(mut self, n: usize) -> Self {
        self.config.pages_per_chunk = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn output_location(mut self, location: impl Into<String>) -> Self {
        self.config.output_location = Some(location.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, FinExtractError> {
        let c = &self.config;
        if c.pages_per_chunk == 0 {
            return Err(FinExtractError::InvalidConfig(
                "pages_per_chunk must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(FinExtractError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_retries > 10 {
            return Err(FinExtractError::InvalidConfig(format!(
                "max_retries must be 0–10, got {}",
                c.max_retries
            )));
        }
        if let Some(location) = &c.output_location {
            crate::storage::BlobUri::parse_prefix(location)?;
        }
        Ok(self.config)
    }
}

// ── External clients ─────────────────────────────────────────────────────

/// Connection settings for the Document AI processor.
#[derive(Clone)]
pub struct DocumentAiConfig {
    pub project_id: String,

    /// Processor region, e.g. `us` or `eu`.
    pub location: String,

    pub processor_id: String,

    /// Base URL override. Default: `https://{location}-documentai.googleapis.com`.
    pub endpoint: Option<String>,

    /// OAuth2 bearer token.
    pub access_token: Option<String>,
}

impl DocumentAiConfig {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        processor_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            location: location.into(),
            processor_id: processor_id.into(),
            endpoint: None,
            access_token: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// The `:process` URL for this processor.
    pub fn process_url(&self) -> String {
        let base = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-documentai.googleapis.com", self.location));
        format!(
            "{}/v1/projects/{}/locations/{}/processors/{}:process",
            base.trim_end_matches('/'),
            self.project_id,
            self.location,
            self.processor_id
        )
    }

    pub fn validate(&self) -> Result<(), FinExtractError> {
        for (name, value) in [
            ("project_id", &self.project_id),
            ("location", &self.location),
            ("processor_id", &self.processor_id),
        ] {
            if value.trim().is_empty() {
                return Err(FinExtractError::InvalidConfig(format!(
                    "Document AI {name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DocumentAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentAiConfig")
            .field("project_id", &self.project_id)
            .field("location", &self.location)
            .field("processor_id", &self.processor_id)
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Settings for the blob stores.
#[derive(Clone, Default)]
pub struct StorageConfig {
    /// Root directory backing `file://bucket/key` URIs. Default: None
    /// (`file://` disabled).
    pub local_root: Option<PathBuf>,

    /// Cloud Storage base URL override. Default: `https://storage.googleapis.com`.
    pub gcs_endpoint: Option<String>,

    /// OAuth2 bearer token for Cloud Storage.
    pub gcs_access_token: Option<String>,

    /// Register the process-local `mem://` store. Default: false.
    ///
    /// Objects written there live only as long as the process and are never
    /// evicted.
    pub memory_store: bool,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("local_root", &self.local_root)
            .field("gcs_endpoint", &self.gcs_endpoint)
            .field(
                "gcs_access_token",
                &self.gcs_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("memory_store", &self.memory_store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.pages_per_chunk, 15);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_retries, 2);
        assert!(c.output_location.is_none());
    }

    #[test]
    fn builder_rejects_zero_page_limit() {
        let err = PipelineConfig::builder().pages_per_chunk(0).build().unwrap_err();
        assert!(matches!(err, FinExtractError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_output_location() {
        assert!(PipelineConfig::builder()
            .output_location("not-a-uri")
            .build()
            .is_err());
        assert!(PipelineConfig::builder()
            .output_location("gs://bucket")
            .build()
            .is_ok());
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = PipelineConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = PipelineConfig::builder().password("hunter2").build().unwrap();
        assert!(!format!("{c:?}").contains("hunter2"));
        let d = DocumentAiConfig::new("p", "us", "abc").with_access_token("ya29.secret");
        assert!(!format!("{d:?}").contains("ya29"));
    }

    #[test]
    fn process_url_defaults_to_regional_endpoint() {
        let d = DocumentAiConfig::new("my-project", "eu", "f00");
        assert_eq!(
            d.process_url(),
            "https://eu-documentai.googleapis.com/v1/projects/my-project/locations/eu/processors/f00:process"
        );
        let d = d.with_endpoint("http://127.0.0.1:9000/");
        assert!(d.process_url().starts_with("http://127.0.0.1:9000/v1/projects/"));
    }

    #[test]
    fn validate_rejects_blank_ids() {
        assert!(DocumentAiConfig::new("", "us", "x").validate().is_err());
        assert!(DocumentAiConfig::new("p", "us", "x").validate().is_ok());
    }
}
