//! Pipeline entry points: document in, record and artifacts out.
//!
//! ```text
//! blob ─get─▶ bytes ─split─▶ chunks ─extract─▶ entities ─normalize─▶ records
//!                                                                      │
//!   artifacts ◀─put─ JSON + CSV ◀─serialize─ FinalRecord ◀─ratios─ merge
//! ```
//!
//! Nothing is uploaded until the record and both renderings exist, so a run
//! that fails before storage leaves no partial artifacts behind.

use crate::config::{DocumentAiConfig, PipelineConfig, StorageConfig};
use crate::error::{EngineError, FinExtractError};
use crate::output::{
    ChunkResult, DocumentInspection, ExtractionOutput, FinalRecord, ProcessingOutput,
    ProcessingStats,
};
use crate::pipeline::chunk::{plan_chunks, DocumentChunk, DocumentSplitter, PdfiumSplitter};
use crate::pipeline::engine::{DocumentAiEngine, ExtractionEngine};
use crate::pipeline::{merge, normalize, ratios, serialize};
use crate::record::{ExtractedRecord, RawEntity};
use crate::storage::{
    write_atomic, BlobStore, BlobUri, StoreRouter, CONTENT_TYPE_CSV, CONTENT_TYPE_JSON,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Owns the collaborators for a sequence of runs.
///
/// Clients are constructed once and shared; every run gets its own
/// accumulator, so concurrent requests never share mutable state.
#[derive(Clone)]
pub struct Pipeline {
    splitter: Arc<dyn DocumentSplitter>,
    engine: Arc<dyn ExtractionEngine>,
    store: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

/// Paths written by [`Pipeline::process_file`].
#[derive(Debug, Clone)]
pub struct LocalArtifacts {
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
    pub output: ExtractionOutput,
}

/// Why one engine attempt did not produce entities.
enum AttemptFailure {
    Timeout,
    Engine(EngineError),
}

impl Pipeline {
    pub fn new(
        splitter: Arc<dyn DocumentSplitter>,
        engine: Arc<dyn ExtractionEngine>,
        store: Arc<dyn BlobStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            splitter,
            engine,
            store,
            config,
        }
    }

    /// Build the production collaborators: pdfium splitter, Document AI
    /// engine, and the store router from [`StoreRouter::from_config`].
    pub fn connect(
        config: PipelineConfig,
        document_ai: DocumentAiConfig,
        storage: StorageConfig,
    ) -> Result<Self, FinExtractError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FinExtractError::Internal(format!("HTTP client: {e}")))?;

        let splitter = PdfiumSplitter::new(config.pdfium_lib_path.clone(), config.password.clone());
        let engine = DocumentAiEngine::new(client.clone(), document_ai)?;

        let router = StoreRouter::from_config(client, storage);
        info!(
            "Pipeline ready: engine={}, stores=[{}]",
            engine.process_url(),
            router.schemes().join(", ")
        );

        Ok(Self::new(
            Arc::new(splitter),
            Arc::new(engine),
            Arc::new(router),
            config,
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ── Entry points ─────────────────────────────────────────────────────

    /// Download a document, extract it, and upload `<basename>.json` and
    /// `<basename>.csv` under the configured output location.
    pub async fn process_uri(&self, source_uri: &str) -> Result<ProcessingOutput, FinExtractError> {
        let source = BlobUri::parse(source_uri)?;
        let prefix = self.output_prefix()?;
        info!("Processing PDF from URI: {}", source);

        let bytes = self.store.get(&source).await?;
        let output = self.extract_bytes(bytes).await?;
        let (json, csv) = render_artifacts(&output.record)?;

        let base = source.basename();
        let json_uri = self
            .store
            .put(json.into_bytes(), &prefix.child(&format!("{base}.json")), CONTENT_TYPE_JSON)
            .await?;
        let csv_uri = self
            .store
            .put(csv.into_bytes(), &prefix.child(&format!("{base}.csv")), CONTENT_TYPE_CSV)
            .await?;
        info!("Artifacts written: {} and {}", json_uri, csv_uri);

        Ok(ProcessingOutput {
            json_uri: json_uri.to_string(),
            csv_uri: csv_uri.to_string(),
            output,
        })
    }

    /// Extract a local PDF and write both artifacts into `out_dir`.
    ///
    /// Each file is written atomically (temp file + rename).
    pub async fn process_file(
        &self,
        pdf_path: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
    ) -> Result<LocalArtifacts, FinExtractError> {
        let pdf_path = pdf_path.as_ref();
        let bytes = tokio::fs::read(pdf_path).await.map_err(|e| {
            FinExtractError::InvalidRequest(format!("cannot read {}: {e}", pdf_path.display()))
        })?;

        let output = self.extract_bytes(bytes).await?;
        let (json, csv) = render_artifacts(&output.record)?;

        let base = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let json_path = out_dir.as_ref().join(format!("{base}.json"));
        let csv_path = out_dir.as_ref().join(format!("{base}.csv"));

        let (jp, cp) = (json_path.clone(), csv_path.clone());
        tokio::task::spawn_blocking(move || {
            write_atomic(&jp, json.as_bytes())?;
            write_atomic(&cp, csv.as_bytes())
        })
        .await
        .map_err(|e| FinExtractError::Internal(format!("Write task panicked: {e}")))??;

        Ok(LocalArtifacts {
            json_path,
            csv_path,
            output,
        })
    }

    /// Split, extract, normalize, merge and compute ratios.
    pub async fn extract_bytes(&self, bytes: Vec<u8>) -> Result<ExtractionOutput, FinExtractError> {
        let total_start = Instant::now();

        // ── Step 1: Split ────────────────────────────────────────────────
        let split_start = Instant::now();
        let splitter = Arc::clone(&self.splitter);
        let limit = self.config.pages_per_chunk;
        let chunks = tokio::task::spawn_blocking(move || splitter.split(&bytes, limit))
            .await
            .map_err(|e| FinExtractError::Internal(format!("Split task panicked: {e}")))??;
        let split_duration_ms = split_start.elapsed().as_millis() as u64;

        let total_pages: usize = chunks.iter().map(|c| c.pages.count).sum();
        let total_chunks = chunks.len();
        info!(
            "Split {} pages into {} chunks in {}ms",
            total_pages, total_chunks, split_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_start(total_pages, total_chunks);
        }

        // ── Step 2: Extract + normalize each chunk ───────────────────────
        let extraction_start = Instant::now();
        let mut results: Vec<(ChunkResult, ExtractedRecord)> = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| self.extract_chunk(chunk, total_chunks)),
        )
        .buffer_unordered(self.config.concurrency.max(1))
        .try_collect()
        .await?;
        let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

        // Merge order is chunk order, whatever order the calls finished in.
        results.sort_by_key(|(r, _)| r.chunk_num);
        let (chunk_results, records): (Vec<ChunkResult>, Vec<ExtractedRecord>) =
            results.into_iter().unzip();

        // ── Step 3: Merge ────────────────────────────────────────────────
        let merged = merge::merge_records(records);
        debug!(
            "Merged record: {}",
            serde_json::to_string(&merged).unwrap_or_default()
        );

        // ── Step 4: Ratios ───────────────────────────────────────────────
        let metrics = ratios::calculate_metrics(&merged);

        let stats = ProcessingStats {
            total_pages,
            total_chunks,
            total_entities: chunk_results.iter().map(|c| c.entity_count).sum(),
            total_retries: chunk_results.iter().map(|c| c.retries).sum(),
            fields_extracted: merged.len(),
            metrics_calculated: metrics.len(),
            split_duration_ms,
            extraction_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Extraction complete: {} fields, {} metrics, {}ms total",
            stats.fields_extracted, stats.metrics_calculated, stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_complete(stats.fields_extracted, stats.metrics_calculated);
        }

        Ok(ExtractionOutput {
            record: FinalRecord::new(merged, metrics),
            chunks: chunk_results,
            stats,
        })
    }

    /// Document metadata and chunk plan, without calling the engine.
    pub async fn inspect(&self, bytes: Vec<u8>) -> Result<DocumentInspection, FinExtractError> {
        inspect_with(Arc::clone(&self.splitter), bytes, self.config.pages_per_chunk).await
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn output_prefix(&self) -> Result<BlobUri, FinExtractError> {
        let location = self.config.output_location.as_deref().ok_or_else(|| {
            FinExtractError::InvalidConfig("no output location configured".into())
        })?;
        BlobUri::parse_prefix(location)
    }

    async fn extract_chunk(
        &self,
        chunk: DocumentChunk,
        total_chunks: usize,
    ) -> Result<(ChunkResult, ExtractedRecord), FinExtractError> {
        let chunk_num = chunk.index + 1;
        info!("Processing chunk {} / {} ({})", chunk_num, total_chunks, chunk.pages);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_chunk_start(chunk_num, total_chunks);
        }

        let start = Instant::now();
        let (entities, retries) = match self.call_engine(&chunk.bytes, chunk_num, total_chunks).await {
            Ok(ok) => ok,
            Err(e) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_chunk_error(chunk_num, total_chunks, &e.to_string());
                }
                return Err(e);
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let entity_count = entities.iter().map(RawEntity::subtree_len).sum();
        let record = normalize::normalize_entities(&entities);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_chunk_complete(chunk_num, total_chunks, entity_count);
        }

        Ok((
            ChunkResult {
                chunk_num,
                pages: chunk.pages,
                entity_count,
                field_count: record.len(),
                retries,
                duration_ms,
            },
            record,
        ))
    }

    /// Call the engine with a per-attempt timeout, retrying timeouts and
    /// transient failures with exponential backoff.
    async fn call_engine(
        &self,
        document: &[u8],
        chunk: usize,
        total: usize,
    ) -> Result<(Vec<RawEntity>, u32), FinExtractError> {
        let timeout_secs = self.config.api_timeout_secs;
        let max_retries = self.config.max_retries;
        let mut last_failure = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = self
                    .config
                    .retry_backoff_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1));
                warn!(
                    "Chunk {}: retry {}/{} after {}ms",
                    chunk, attempt, max_retries, backoff
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.engine.extract(document);
            match tokio::time::timeout(Duration::from_secs(timeout_secs), call).await {
                Ok(Ok(entities)) => return Ok((entities, attempt)),
                Ok(Err(e)) if e.is_transient() => {
                    warn!("Chunk {}: attempt {} failed: {}", chunk, attempt + 1, e);
                    last_failure = Some(AttemptFailure::Engine(e));
                }
                Ok(Err(e)) => {
                    return Err(FinExtractError::ExtractionFailed {
                        chunk,
                        total,
                        detail: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        "Chunk {}: attempt {} timed out after {}s",
                        chunk,
                        attempt + 1,
                        timeout_secs
                    );
                    last_failure = Some(AttemptFailure::Timeout);
                }
            }
        }

        Err(match last_failure {
            Some(AttemptFailure::Timeout) => FinExtractError::ExtractionTimeout {
                chunk,
                total,
                secs: timeout_secs,
            },
            Some(AttemptFailure::Engine(e)) => FinExtractError::ExtractionFailed {
                chunk,
                total,
                detail: format!("{e} (after {max_retries} retries)"),
            },
            None => FinExtractError::Internal(format!("chunk {chunk}: no engine attempt made")),
        })
    }
}

/// JSON artifact, and the CSV artifact derived from it.
fn render_artifacts(record: &FinalRecord) -> Result<(String, String), FinExtractError> {
    let json = serialize::to_json(record)?;
    let csv = serialize::csv_from_json(&json)?;
    Ok((json, csv))
}

async fn inspect_with(
    splitter: Arc<dyn DocumentSplitter>,
    bytes: Vec<u8>,
    pages_per_chunk: usize,
) -> Result<DocumentInspection, FinExtractError> {
    let metadata = tokio::task::spawn_blocking(move || splitter.inspect(&bytes))
        .await
        .map_err(|e| FinExtractError::Internal(format!("Inspect task panicked: {e}")))??;
    Ok(DocumentInspection {
        chunks: plan_chunks(metadata.page_count, pages_per_chunk),
        pages_per_chunk,
        metadata,
    })
}

/// Inspect a document with the pdfium splitter described by `config`.
///
/// Does not require extraction-engine credentials.
pub async fn inspect(bytes: Vec<u8>, config: &PipelineConfig) -> Result<DocumentInspection, FinExtractError> {
    let splitter = PdfiumSplitter::new(config.pdfium_lib_path.clone(), config.password.clone());
    inspect_with(Arc::new(splitter), bytes, config.pages_per_chunk).await
}

/// Synchronous wrapper around [`Pipeline::process_uri`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(pipeline: &Pipeline, source_uri: &str) -> Result<ProcessingOutput, FinExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FinExtractError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(pipeline.process_uri(source_uri))
}
