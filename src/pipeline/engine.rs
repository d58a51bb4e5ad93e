//! Extraction engine: one chunk of PDF bytes in, a tree of entities out.
//!
//! The engine is a black box behind [`ExtractionEngine`]. The shipped
//! implementation calls a Document AI processor's synchronous `:process`
//! method. Retries and timeouts are the caller's business (see
//! [`crate::process`]); an engine only classifies its failures through
//! [`EngineError::is_transient`].
//!
//! ## Wire format
//!
//! ```text
//! POST {endpoint}/v1/projects/{p}/locations/{l}/processors/{id}:process
//! { "rawDocument": { "content": <base64 PDF>, "mimeType": "application/pdf" } }
//!
//! 200 { "document": { "entities": [
//!         { "type": "Assets", "mentionText": "…", "properties": [ … ] } ] } }
//! ```

use crate::config::DocumentAiConfig;
use crate::error::{EngineError, FinExtractError};
use crate::record::RawEntity;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A document-to-entities service.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Extract the top-level entities of one self-contained document.
    async fn extract(&self, document: &[u8]) -> Result<Vec<RawEntity>, EngineError>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    raw_document: RawDocument<'a>,
    skip_human_review: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    document: Option<WireDocument>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDocument {
    #[serde(default)]
    entities: Vec<WireEntity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntity {
    #[serde(rename = "type", default)]
    entity_type: String,
    #[serde(default)]
    mention_text: String,
    #[serde(default)]
    properties: Vec<WireEntity>,
}

impl From<WireEntity> for RawEntity {
    fn from(wire: WireEntity) -> Self {
        RawEntity {
            entity_type: wire.entity_type,
            text: wire.mention_text,
            children: wire.properties.into_iter().map(RawEntity::from).collect(),
        }
    }
}

/// Decode a `:process` response body into entities.
///
/// A response without a document or without entities is an empty chunk, not
/// an error. Confidence, page anchors and normalized values are dropped.
pub fn decode_response(body: &[u8]) -> Result<Vec<RawEntity>, EngineError> {
    let response: ProcessResponse =
        serde_json::from_slice(body).map_err(|e| EngineError::Decode(e.to_string()))?;
    Ok(response
        .document
        .unwrap_or_default()
        .entities
        .into_iter()
        .map(RawEntity::from)
        .collect())
}

/// Request body for one chunk.
pub fn encode_request(document: &[u8]) -> Result<Vec<u8>, EngineError> {
    let request = ProcessRequest {
        raw_document: RawDocument {
            content: STANDARD.encode(document),
            mime_type: PDF_MIME_TYPE,
        },
        skip_human_review: true,
    };
    serde_json::to_vec(&request).map_err(|e| EngineError::Decode(e.to_string()))
}

// ── Document AI ──────────────────────────────────────────────────────────────

/// [`ExtractionEngine`] backed by a Document AI processor.
#[derive(Clone)]
pub struct DocumentAiEngine {
    client: Client,
    config: DocumentAiConfig,
    url: String,
}

impl DocumentAiEngine {
    pub fn new(client: Client, config: DocumentAiConfig) -> Result<Self, FinExtractError> {
        config.validate()?;
        let url = config.process_url();
        Ok(Self { client, config, url })
    }

    pub fn process_url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ExtractionEngine for DocumentAiEngine {
    async fn extract(&self, document: &[u8]) -> Result<Vec<RawEntity>, EngineError> {
        let body = encode_request(document)?;
        debug!("POST {} ({} document bytes)", self.url, document.len());

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(EngineError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let entities = decode_response(&bytes)?;
        debug!("Engine returned {} top-level entities", entities.len());
        Ok(entities)
    }
}
