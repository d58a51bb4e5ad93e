//! Output types returned by the extraction pipeline.

use crate::error::FinExtractError;
use crate::pipeline::chunk::PageRange;
use crate::pipeline::ratios::CalculatedMetrics;
use crate::record::ExtractedRecord;
use serde::{Deserialize, Serialize};

/// The unit persisted and returned for one document.
///
/// Field names match the artifact layout consumed downstream, so the JSON
/// artifact is exactly `serde_json::to_string_pretty(&final_record)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalRecord {
    #[serde(rename = "Extracted Data")]
    pub extracted_data: ExtractedRecord,

    #[serde(rename = "Calculated Metrics")]
    pub calculated_metrics: CalculatedMetrics,
}

impl FinalRecord {
    pub fn new(extracted_data: ExtractedRecord, calculated_metrics: CalculatedMetrics) -> Self {
        Self {
            extracted_data,
            calculated_metrics,
        }
    }

    /// Parse a JSON artifact back into a record.
    ///
    /// Anything that is not a JSON object with both sections is a
    /// [`FinExtractError::ConversionError`].
    pub fn from_json(text: &str) -> Result<Self, FinExtractError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| FinExtractError::ConversionError(format!("invalid JSON: {e}")))?;

        let Some(object) = value.as_object() else {
            return Err(FinExtractError::ConversionError(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        };
        for section in ["Extracted Data", "Calculated Metrics"] {
            if !object.contains_key(section) {
                return Err(FinExtractError::ConversionError(format!(
                    "missing section '{section}'"
                )));
            }
        }

        serde_json::from_value(value)
            .map_err(|e| FinExtractError::ConversionError(format!("not a final record: {e}")))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// What happened to one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    /// 1-indexed chunk number.
    pub chunk_num: usize,

    /// Pages covered by this chunk.
    pub pages: PageRange,

    /// Entities returned by the engine, counting nested children.
    pub entity_count: usize,

    /// Fields in this chunk's normalized record.
    pub field_count: usize,

    /// Retries spent before the call succeeded.
    pub retries: u32,

    /// Wall-clock time for the engine call(s) in milliseconds.
    pub duration_ms: u64,
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Total pages in the input document.
    pub total_pages: usize,

    /// Number of chunks the document was split into.
    pub total_chunks: usize,

    /// Entities returned across all chunks.
    pub total_entities: usize,

    /// Retries across all chunks.
    pub total_retries: u32,

    /// Top-level fields in the merged record.
    pub fields_extracted: usize,

    /// Ratios that could be computed.
    pub metrics_calculated: usize,

    /// Time spent splitting the document.
    pub split_duration_ms: u64,

    /// Time spent in engine calls (wall clock, not summed).
    pub extraction_duration_ms: u64,

    /// Total wall-clock time.
    pub total_duration_ms: u64,
}

/// Result of [`crate::Pipeline::extract_bytes`]: the record plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub record: FinalRecord,
    pub chunks: Vec<ChunkResult>,
    pub stats: ProcessingStats,
}

/// Result of [`crate::Pipeline::process_uri`]: where the artifacts landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutput {
    pub json_uri: String,
    pub csv_uri: String,
    pub output: ExtractionOutput,
}

/// Document metadata read without calling the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Metadata plus the chunk plan the pipeline would use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInspection {
    pub metadata: DocumentMetadata,
    pub pages_per_chunk: usize,
    pub chunks: Vec<PageRange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn final_record_uses_artifact_section_names() {
        let mut data = ExtractedRecord::new();
        data.insert("Year".into(), FieldValue::scalar("2023"));
        let record = FinalRecord::new(data, CalculatedMetrics::default());
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"Extracted Data":{"Year":"2023"},"Calculated Metrics":{}}"#);
    }

    #[test]
    fn from_json_rejects_non_records() {
        for text in ["[]", "\"text\"", "{", r#"{"Extracted Data":{}}"#] {
            let err = FinalRecord::from_json(text).unwrap_err();
            assert!(
                matches!(err, FinExtractError::ConversionError(_)),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn from_json_rejects_non_numeric_metrics() {
        let text = r#"{"Extracted Data":{},"Calculated Metrics":{"Leverage Ratio":"N/A"}}"#;
        assert!(FinalRecord::from_json(text).is_err());
    }

    #[test]
    fn from_json_accepts_record() {
        let text = r#"{"Extracted Data":{"Assets":{"Total-Assets":"10"}},"Calculated Metrics":{"Leverage Ratio":0.5}}"#;
        let record = FinalRecord::from_json(text).unwrap();
        assert_eq!(record.calculated_metrics.get_label("Leverage Ratio"), Some(0.5));
        assert!(record.extracted_data["Assets"].is_group());
    }
}
