//! Error types for the fin-extract library.
//!
//! Two error types reflect two failure modes:
//!
//! * [`FinExtractError`]: **Fatal**: the request cannot complete (unparseable
//!   document, a chunk that kept failing, storage unreachable). Every pipeline
//!   entry point returns `Err(FinExtractError)` and nothing is persisted.
//!
//! * [`EngineError`]: a single call to the extraction engine failed. It
//!   carries enough detail to decide whether the call is worth retrying; once
//!   retries are exhausted the pipeline wraps it into
//!   [`FinExtractError::ExtractionFailed`] with the chunk position attached.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fin-extract library.
#[derive(Debug, Error)]
pub enum FinExtractError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The caller's request was missing or malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A blob URI did not follow the `scheme://bucket/key` layout.
    #[error("Invalid blob URI '{uri}': expected scheme://bucket/key")]
    InvalidBlobUri { uri: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// The input bytes could not be parsed as a paginated document.
    #[error("Malformed document: {detail}")]
    MalformedDocument { detail: String },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The extraction engine failed for one chunk after all retries.
    #[error("Extraction failed for chunk {chunk}/{total}: {detail}")]
    ExtractionFailed {
        chunk: usize,
        total: usize,
        detail: String,
    },

    /// Every attempt for one chunk hit the per-call timeout.
    #[error("Extraction timed out after {secs}s for chunk {chunk}/{total}")]
    ExtractionTimeout {
        chunk: usize,
        total: usize,
        secs: u64,
    },

    // ── Storage errors ────────────────────────────────────────────────────
    /// A blob store `get` or `put` failed.
    #[error("Storage failure for '{uri}': {reason}")]
    StorageFailure { uri: String, reason: String },

    /// Could not create or write a local output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Serialisation errors ──────────────────────────────────────────────
    /// The serializer was handed something that is not a final record.
    #[error("Conversion error: {0}")]
    ConversionError(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FinExtractError {
    /// Whether the failure was caused by the caller's input rather than by
    /// the pipeline or one of its collaborators.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FinExtractError::InvalidRequest(_) | FinExtractError::InvalidBlobUri { .. }
        )
    }
}

/// A failed call to the extraction engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The request never produced an HTTP response (DNS, TLS, reset, …).
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine answered with a non-success status.
    #[error("engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The engine answered 2xx but the body could not be decoded.
    #[error("malformed engine response: {0}")]
    Decode(String),
}

impl EngineError {
    /// Transport failures, rate limiting and server-side errors are worth
    /// another attempt; client errors and undecodable bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Transport(_) => true,
            EngineError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            EngineError::Decode(_) => false,
        }
    }
}
