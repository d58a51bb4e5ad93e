//! HTTP boundary: a thin axum router over [`Pipeline::process_uri`].
//!
//! | Route | Body | Success |
//! |---|---|---|
//! | `POST /`, `POST /process` | `{"pdf_source_uri": "gs://bucket/key.pdf"}` | 200 with artifact URIs and the record |
//! | `GET /health` | | 200 `{"status": "ok"}` |
//!
//! `pdf_gcs_uri` is accepted as an alias for `pdf_source_uri`. Caller errors
//! answer 400 `{"error": …}`; everything else answers 500 `{"error": …}`.

use crate::error::FinExtractError;
use crate::output::{FinalRecord, ProcessingStats};
use crate::pipeline::ratios::CalculatedMetrics;
use crate::process::Pipeline;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(alias = "pdf_gcs_uri")]
    pub pdf_source_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub json_uri: String,
    pub csv_uri: String,
    pub extracted_data: FinalRecord,
    pub calculated_metrics: CalculatedMetrics,
    pub stats: ProcessingStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error wrapper so handlers can use `?`.
pub struct ApiError(FinExtractError);

impl From<FinExtractError> for ApiError {
    fn from(e: FinExtractError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            warn!("Rejected request: {}", self.0);
            StatusCode::BAD_REQUEST
        } else {
            error!("Error processing PDF: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Build the router.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", post(process_pdf))
        .route("/process", post(process_pdf))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Parse the request body, tolerating any content type.
pub fn parse_request(body: &[u8]) -> Result<String, FinExtractError> {
    let request: ProcessRequest = serde_json::from_slice(body)
        .map_err(|e| FinExtractError::InvalidRequest(format!("body is not a valid request: {e}")))?;
    match request.pdf_source_uri {
        Some(uri) if !uri.trim().is_empty() => Ok(uri),
        _ => Err(FinExtractError::InvalidRequest(
            "Missing PDF source URI in request".into(),
        )),
    }
}

/// POST / and POST /process
async fn process_pdf(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ProcessResponse>, ApiError> {
    let uri = parse_request(&body)?;
    info!("Received request for {}", uri);

    let processed = state.pipeline.process_uri(&uri).await?;
    let output = processed.output;
    Ok(Json(ProcessResponse {
        json_uri: processed.json_uri,
        csv_uri: processed.csv_uri,
        calculated_metrics: output.record.calculated_metrics.clone(),
        extracted_data: output.record,
        stats: output.stats,
    }))
}
