//! Shared fakes for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use fin_extract::pipeline::chunk::plan_chunks;
use fin_extract::{
    DocumentChunk, DocumentMetadata, DocumentSplitter, EngineError, ExtractionEngine,
    FinExtractError, MemoryBlobStore, Pipeline, PipelineConfig, RawEntity,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Splitter that ignores the bytes and pretends the document has `pages` pages.
///
/// Each chunk's bytes are `chunk-<index>` so a scripted engine can tell them apart.
pub struct FakeSplitter {
    pub pages: usize,
}

impl DocumentSplitter for FakeSplitter {
    fn split(&self, _bytes: &[u8], pages_per_chunk: usize) -> Result<Vec<DocumentChunk>, FinExtractError> {
        Ok(plan_chunks(self.pages, pages_per_chunk)
            .into_iter()
            .enumerate()
            .map(|(index, pages)| DocumentChunk {
                index,
                pages,
                bytes: format!("chunk-{index}").into_bytes(),
            })
            .collect())
    }

    fn inspect(&self, _bytes: &[u8]) -> Result<DocumentMetadata, FinExtractError> {
        Ok(DocumentMetadata {
            page_count: self.pages,
            ..Default::default()
        })
    }
}

/// One scripted engine answer.
#[derive(Clone)]
pub enum Step {
    Entities(Vec<RawEntity>),
    Fail(EngineError),
    /// Sleep, then answer with the entities.
    Slow(Duration, Vec<RawEntity>),
}

/// Engine that answers per chunk from a script.
///
/// Answers for a chunk are consumed in order; the last one repeats. Chunks
/// beyond the script reuse the last chunk's script.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<Vec<VecDeque<Step>>>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().map(VecDeque::from).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self, chunk: usize) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        let last = scripts.len() - 1;
        let script = &mut scripts[chunk.min(last)];
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

fn chunk_index(document: &[u8]) -> usize {
    std::str::from_utf8(document)
        .ok()
        .and_then(|s| s.strip_prefix("chunk-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    async fn extract(&self, document: &[u8]) -> Result<Vec<RawEntity>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step(chunk_index(document)) {
            Step::Entities(entities) => Ok(entities),
            Step::Fail(e) => Err(e),
            Step::Slow(delay, entities) => {
                tokio::time::sleep(delay).await;
                Ok(entities)
            }
        }
    }
}

pub fn group(name: &str, children: &[(&str, &str)]) -> RawEntity {
    RawEntity::parent(
        name,
        "",
        children.iter().map(|(k, v)| RawEntity::leaf(*k, *v)).collect(),
    )
}

/// Three chunks of a 32-page annual report: balance sheet, P&L, notes.
pub fn annual_report_script() -> Vec<Vec<Step>> {
    vec![
        vec![Step::Entities(vec![
            RawEntity::leaf("Year", "2023"),
            group("Assets", &[("Total-Assets", "$2,000")]),
            group("Liabilities", &[("Total-Liabilities", "800"), ("Borrowings", "400")]),
        ])],
        vec![Step::Entities(vec![group(
            "Profit-Loss-Statement",
            &[
                ("Net-Profit", "180"),
                ("Total-Revenue", "1,000"),
                ("Total-Equity", "1,200"),
            ],
        )])],
        vec![Step::Entities(vec![RawEntity::leaf("Auditor", "Smith & Co")])],
    ]
}

pub fn config(output_location: Option<&str>) -> PipelineConfig {
    let mut builder = PipelineConfig::builder().retry_backoff_ms(10).api_timeout_secs(5);
    if let Some(location) = output_location {
        builder = builder.output_location(location);
    }
    builder.build().unwrap()
}

pub fn pipeline(
    pages: usize,
    engine: Arc<ScriptedEngine>,
    store: Arc<MemoryBlobStore>,
    config: PipelineConfig,
) -> Pipeline {
    Pipeline::new(Arc::new(FakeSplitter { pages }), engine, store, config)
}
