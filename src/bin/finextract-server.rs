//! HTTP server for fin-extract.
//!
//! Serves the router from `fin_extract::server` until Ctrl-C / SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use fin_extract::{server, DocumentAiConfig, Pipeline, PipelineConfig, StorageConfig};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve financial-statement extraction over HTTP.
#[derive(Parser, Debug)]
#[command(name = "finextract-server", version, about = "Serve financial-statement extraction over HTTP")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "FINEXTRACT_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Blob URI prefix for the artifacts, e.g. gs://statements-out.
    #[arg(long, env = "FINEXTRACT_OUTPUT_LOCATION")]
    output_location: String,

    #[arg(long, env = "DOCUMENTAI_PROJECT_ID")]
    project: String,

    #[arg(long, env = "DOCUMENTAI_LOCATION", default_value = "us")]
    location: String,

    #[arg(long, env = "DOCUMENTAI_PROCESSOR_ID")]
    processor: String,

    #[arg(long, env = "DOCUMENTAI_ENDPOINT")]
    endpoint: Option<String>,

    /// OAuth2 bearer token for Document AI and Cloud Storage.
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Directory backing file://bucket/key URIs.
    #[arg(long, env = "FINEXTRACT_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    #[arg(long, env = "FINEXTRACT_PAGES_PER_CHUNK", default_value_t = 15)]
    pages_per_chunk: usize,

    #[arg(long, env = "FINEXTRACT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    #[arg(long, env = "FINEXTRACT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    #[arg(long, env = "FINEXTRACT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = PipelineConfig::builder()
        .output_location(args.output_location.clone())
        .pages_per_chunk(args.pages_per_chunk)
        .concurrency(args.concurrency)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout);
    if let Some(ref path) = args.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut document_ai = DocumentAiConfig::new(&args.project, &args.location, &args.processor);
    if let Some(ref endpoint) = args.endpoint {
        document_ai = document_ai.with_endpoint(endpoint.clone());
    }
    if let Some(ref token) = args.access_token {
        document_ai = document_ai.with_access_token(token.clone());
    }
    let storage = StorageConfig {
        local_root: args.local_root.clone(),
        gcs_endpoint: None,
        gcs_access_token: args.access_token.clone(),
        memory_store: false,
    };

    let pipeline = Pipeline::connect(config, document_ai, storage).context("Failed to set up pipeline")?;
    let app = server::router(Arc::new(pipeline));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("🚀 Listening on http://{}", args.bind);
    info!("📝 Output location: {}", args.output_location);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
