//! HTTP router tests, driven with `tower::ServiceExt::oneshot`.
#![cfg(feature = "server")]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{annual_report_script, config, pipeline, ScriptedEngine, Step};
use fin_extract::{server, EngineError, MemoryBlobStore};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app(script: Vec<Vec<Step>>, store: Arc<MemoryBlobStore>) -> axum::Router {
    let p = pipeline(
        32,
        Arc::new(ScriptedEngine::new(script)),
        store,
        config(Some("mem://out")),
    );
    server::router(Arc::new(p))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_answers_ok() {
    let response = app(vec![], Arc::new(MemoryBlobStore::new()))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn missing_uri_is_bad_request() {
    let response = app(vec![], Arc::new(MemoryBlobStore::new()))
        .oneshot(post("/", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Missing PDF source URI"));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let response = app(vec![], Arc::new(MemoryBlobStore::new()))
        .oneshot(post("/process", "not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn successful_request_returns_artifact_uris_and_record() {
    let store = Arc::new(MemoryBlobStore::new());
    store.insert("mem://in/acme-2023.pdf", b"%PDF".to_vec(), "application/pdf");

    let response = app(annual_report_script(), Arc::clone(&store))
        .oneshot(post("/", r#"{"pdf_gcs_uri": "mem://in/acme-2023.pdf"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["json_uri"], "mem://out/acme-2023.json");
    assert_eq!(body["csv_uri"], "mem://out/acme-2023.csv");
    assert_eq!(body["extracted_data"]["Extracted Data"]["Year"], "2023");
    assert_eq!(body["calculated_metrics"]["Return on Assets"], 0.09);
    assert_eq!(body["stats"]["total_chunks"], 3);
    assert!(store.object("mem://out/acme-2023.csv").is_some());
}

#[tokio::test]
async fn engine_failure_is_internal_error() {
    let store = Arc::new(MemoryBlobStore::new());
    store.insert("mem://in/a.pdf", b"%PDF".to_vec(), "application/pdf");
    let script = vec![vec![Step::Fail(EngineError::Status {
        status: 403,
        body: "permission denied".into(),
    })]];

    let response = app(script, Arc::clone(&store))
        .oneshot(post("/process", r#"{"pdf_source_uri": "mem://in/a.pdf"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("chunk 1"));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn missing_source_object_is_internal_error() {
    let response = app(annual_report_script(), Arc::new(MemoryBlobStore::new()))
        .oneshot(post("/", r#"{"pdf_source_uri": "mem://in/nowhere.pdf"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
