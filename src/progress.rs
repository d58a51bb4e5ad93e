//! Progress-callback trait for per-chunk extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline submits each chunk to the extraction engine.
//!
//! # Example
//!
//! ```rust
//! use fin_extract::{ExtractionProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     entities: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, chunk_num: usize, total_chunks: usize, entity_count: usize) {
//!         self.entities.fetch_add(entity_count, Ordering::SeqCst);
//!         eprintln!("Chunk {}/{} done", chunk_num, total_chunks);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { entities: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it extracts each chunk.
///
/// All methods have no-op defaults. With `concurrency > 1` the chunk events
/// may arrive concurrently and out of chunk order.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the document has been split.
    fn on_extraction_start(&self, total_pages: usize, total_chunks: usize) {
        let _ = (total_pages, total_chunks);
    }

    /// Called before the first engine call for a chunk (1-indexed).
    fn on_chunk_start(&self, chunk_num: usize, total_chunks: usize) {
        let _ = (chunk_num, total_chunks);
    }

    /// Called when a chunk's entities have been received.
    fn on_chunk_complete(&self, chunk_num: usize, total_chunks: usize, entity_count: usize) {
        let _ = (chunk_num, total_chunks, entity_count);
    }

    /// Called when a chunk fails after all retries. The run aborts afterwards.
    fn on_chunk_error(&self, chunk_num: usize, total_chunks: usize, error: &str) {
        let _ = (chunk_num, total_chunks, error);
    }

    /// Called once the record and metrics are ready.
    fn on_extraction_complete(&self, fields_extracted: usize, metrics_calculated: usize) {
        let _ = (fields_extracted, metrics_calculated);
    }
}

/// A no-op implementation.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
