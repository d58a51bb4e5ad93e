//! Chunker: split a PDF into bounded page groups for the extraction engine.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to drive from async contexts. Splitting is run on
//! the blocking pool by the pipeline; everything in this module is
//! synchronous.
//!
//! ## Why a separate plan?
//!
//! [`plan_chunks`] decides which pages go together without touching a PDF.
//! The pdfium backend only copies the planned ranges, so the partitioning
//! rules are testable without the shared library installed.

use crate::error::FinExtractError;
use crate::output::DocumentMetadata;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A run of consecutive pages, 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub first: usize,
    pub count: usize,
}

impl PageRange {
    /// Index of the last page in the range.
    pub fn last(&self) -> usize {
        self.first + self.count.saturating_sub(1)
    }
}

impl std::fmt::Display for PageRange {
    /// 1-indexed, inclusive: `pages 16-30`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 1 {
            write!(f, "page {}", self.first + 1)
        } else {
            write!(f, "pages {}-{}", self.first + 1, self.last() + 1)
        }
    }
}

/// Partition `total_pages` into consecutive runs of at most `limit` pages.
///
/// Returns `ceil(total_pages / limit)` ranges; an empty document yields no
/// ranges. A `limit` of zero is treated as one.
pub fn plan_chunks(total_pages: usize, limit: usize) -> Vec<PageRange> {
    let limit = limit.max(1);
    (0..total_pages)
        .step_by(limit)
        .map(|first| PageRange {
            first,
            count: limit.min(total_pages - first),
        })
        .collect()
}

/// One self-contained sub-document.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// 0-indexed position in the chunk sequence.
    pub index: usize,
    pub pages: PageRange,
    /// A complete PDF holding only `pages`.
    pub bytes: Vec<u8>,
}

/// Turns document bytes into chunks. Implementations are blocking.
pub trait DocumentSplitter: Send + Sync {
    /// Split into chunks of at most `pages_per_chunk` pages, in page order.
    fn split(&self, bytes: &[u8], pages_per_chunk: usize) -> Result<Vec<DocumentChunk>, FinExtractError>;

    /// Read metadata without splitting.
    fn inspect(&self, bytes: &[u8]) -> Result<DocumentMetadata, FinExtractError>;
}

/// [`DocumentSplitter`] backed by pdfium.
///
/// The library is bound on every call: either the explicit path (a file or a
/// directory containing the platform library) or the system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumSplitter {
    lib_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumSplitter {
    pub fn new(lib_path: Option<PathBuf>, password: Option<String>) -> Self {
        Self { lib_path, password }
    }

    fn bind(&self) -> Result<Pdfium, FinExtractError> {
        let bindings = match &self.lib_path {
            Some(path) => Pdfium::bind_to_library(library_file(path)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| FinExtractError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    fn load<'a>(&'a self, pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, FinExtractError> {
        pdfium
            .load_pdf_from_byte_slice(bytes, self.password.as_deref())
            .map_err(|e| FinExtractError::MalformedDocument {
                detail: format!("{e:?}"),
            })
    }
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

fn page_index(idx: usize) -> Result<PdfPageIndex, FinExtractError> {
    PdfPageIndex::try_from(idx).map_err(|_| FinExtractError::MalformedDocument {
        detail: format!("page index {idx} out of range"),
    })
}

impl DocumentSplitter for PdfiumSplitter {
    fn split(&self, bytes: &[u8], pages_per_chunk: usize) -> Result<Vec<DocumentChunk>, FinExtractError> {
        let pdfium = self.bind()?;
        let source = self.load(&pdfium, bytes)?;
        let total_pages = source.pages().len() as usize;
        let plan = plan_chunks(total_pages, pages_per_chunk);
        info!("PDF loaded: {} pages → {} chunks", total_pages, plan.len());

        let mut chunks = Vec::with_capacity(plan.len());
        for (index, pages) in plan.into_iter().enumerate() {
            let malformed = |e: PdfiumError| FinExtractError::MalformedDocument {
                detail: format!("chunk {} ({}): {:?}", index + 1, pages, e),
            };

            let mut part = pdfium.create_new_pdf().map_err(malformed)?;
            part.pages_mut()
                .copy_page_range_from_document(
                    &source,
                    page_index(pages.first)?..=page_index(pages.last())?,
                    0,
                )
                .map_err(malformed)?;
            let bytes = part.save_to_bytes().map_err(malformed)?;

            debug!("Chunk {}: {} → {} bytes", index + 1, pages, bytes.len());
            chunks.push(DocumentChunk {
                index,
                pages,
                bytes,
            });
        }
        Ok(chunks)
    }

    fn inspect(&self, bytes: &[u8]) -> Result<DocumentMetadata, FinExtractError> {
        let pdfium = self.bind()?;
        let document = self.load(&pdfium, bytes)?;
        let metadata = document.metadata();

        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        Ok(DocumentMetadata {
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
            modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
            page_count: document.pages().len() as usize,
            pdf_version: format!("{:?}", document.version()),
        })
    }
}
