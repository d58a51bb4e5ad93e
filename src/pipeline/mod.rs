//! Pipeline stages for financial-statement extraction.
//!
//! Each submodule implements exactly one transformation step:
//!
//! ```text
//! chunk ──▶ engine ──▶ normalize ──▶ merge ──▶ ratios ──▶ serialize
//! (pdfium)  (Doc AI)   (per chunk)   (fold)    (12 ratios) (JSON/CSV)
//! ```
//!
//! 1. [`chunk`]: split the PDF into ≤N-page sub-documents; blocking
//! 2. [`engine`]: one chunk in, entity tree out; the only network stage
//! 3. [`normalize`]: entity tree → record, resolving name collisions
//! 4. [`merge`]: fold chunk records in chunk order
//! 5. [`ratios`]: derive ratios, tolerating missing or malformed amounts
//! 6. [`serialize`]: render the final record as JSON and fixed-column CSV

pub mod chunk;
pub mod engine;
pub mod merge;
pub mod normalize;
pub mod ratios;
pub mod serialize;
