//! # fin-extract
//!
//! Extract structured financial data from scanned PDF financial statements,
//! derive standard ratios, and publish the result as JSON and CSV.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Fetch      download from blob storage (gs://, file://, mem://)
//!  ├─ 2. Chunk      split into ≤15-page PDFs via pdfium (spawn_blocking)
//!  ├─ 3. Extract    Document AI :process per chunk, timeout + retry
//!  ├─ 4. Normalize  entity tree → one record per chunk
//!  ├─ 5. Merge      fold chunk records in chunk order
//!  ├─ 6. Ratios     12 ratios, missing inputs omitted
//!  └─ 7. Publish    <basename>.json + <basename>.csv
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fin_extract::{DocumentAiConfig, Pipeline, PipelineConfig, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .output_location("gs://statements-out")
//!         .build()?;
//!     let document_ai = DocumentAiConfig::new("my-project", "us", "0123456789abcdef")
//!         .with_access_token(std::env::var("GOOGLE_ACCESS_TOKEN")?);
//!     let storage = StorageConfig {
//!         gcs_access_token: std::env::var("GOOGLE_ACCESS_TOKEN").ok(),
//!         ..Default::default()
//!     };
//!
//!     let pipeline = Pipeline::connect(config, document_ai, storage)?;
//!     let out = pipeline.process_uri("gs://statements-in/acme-2023.pdf").await?;
//!     println!("{} / {}", out.json_uri, out.csv_uri);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `finextract` binary (clap + anyhow + indicatif) |
//! | `server`| on      | Enables [`server`] and the `finextract-server` binary (axum) |
//!
//! Disable both when embedding only the library:
//! ```toml
//! fin-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod record;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DocumentAiConfig, PipelineConfig, PipelineConfigBuilder, StorageConfig};
pub use error::{EngineError, FinExtractError};
pub use output::{
    ChunkResult, DocumentInspection, DocumentMetadata, ExtractionOutput, FinalRecord,
    ProcessingOutput, ProcessingStats,
};
pub use pipeline::chunk::{DocumentChunk, DocumentSplitter, PageRange, PdfiumSplitter};
pub use pipeline::engine::{DocumentAiEngine, ExtractionEngine};
pub use pipeline::ratios::{CalculatedMetrics, Ratio};
pub use process::{inspect, process_sync, LocalArtifacts, Pipeline};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{ExtractedRecord, FieldGroup, FieldValue, RawEntity};
pub use storage::{BlobStore, BlobUri, GcsBlobStore, LocalBlobStore, MemoryBlobStore, StoreRouter};
