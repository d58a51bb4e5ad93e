//! CLI binary for fin-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` / `DocumentAiConfig` / `StorageConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use fin_extract::{
    inspect, BlobUri, DocumentAiConfig, ExtractionOutput, ExtractionProgressCallback, Pipeline,
    PipelineConfig, ProgressCallback, StorageConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per chunk. Chunks may finish out of
/// order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Splitting PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total_chunks: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, chunk_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&chunk_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize, total_chunks: usize) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Extracting {total_pages} pages in {total_chunks} chunks…"
            ))
        ));
    }

    fn on_chunk_start(&self, chunk_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(chunk_num, Instant::now());
        }
        self.bar.set_message(format!("chunk {chunk_num}"));
    }

    fn on_chunk_complete(&self, chunk_num: usize, total: usize, entity_count: usize) {
        let secs = self.elapsed_secs(chunk_num);
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            chunk_num,
            total,
            dim(&format!("{entity_count:>4} entities")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(chunk_num);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            chunk_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, fields_extracted: usize, metrics_calculated: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} fields extracted, {} ratios calculated",
            green("✔"),
            bold(&fields_extracted.to_string()),
            bold(&metrics_calculated.to_string()),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a local statement into ./out/acme-2023.{json,csv}
  finextract acme-2023.pdf -o out/

  # Print the final record instead of writing files
  finextract --json acme-2023.pdf

  # Process a stored document and upload the artifacts
  finextract gs://statements-in/acme-2023.pdf --output-location gs://statements-out

  # Show page count and chunk plan (no credentials needed)
  finextract --inspect-only acme-2023.pdf

ENVIRONMENT VARIABLES:
  DOCUMENTAI_PROJECT_ID     Google Cloud project of the processor
  DOCUMENTAI_LOCATION       Processor region (default: us)
  DOCUMENTAI_PROCESSOR_ID   Document AI processor ID
  DOCUMENTAI_ENDPOINT       Override the Document AI base URL
  GOOGLE_ACCESS_TOKEN       OAuth2 bearer token for Document AI and Cloud Storage
  FINEXTRACT_LOCAL_ROOT     Directory backing file://bucket/key URIs
  PDFIUM_LIB_PATH           Path to libpdfium (file or directory)
"#;

/// Extract financial statement data from PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "finextract",
    version,
    about = "Extract financial statement data from scanned PDFs into JSON and CSV",
    long_about = "Split a scanned financial statement into chunks, extract entities with a \
Document AI processor, merge them into one record, compute standard financial ratios, and \
write the result as JSON and CSV.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path, or a blob URI (gs://, file://) when --output-location is set.
    input: String,

    /// Directory for <basename>.json and <basename>.csv (local input).
    #[arg(short, long, env = "FINEXTRACT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Blob URI prefix for the artifacts (blob input), e.g. gs://bucket/prefix.
    #[arg(long, env = "FINEXTRACT_OUTPUT_LOCATION")]
    output_location: Option<String>,

    /// Google Cloud project of the Document AI processor.
    #[arg(long, env = "DOCUMENTAI_PROJECT_ID")]
    project: Option<String>,

    /// Document AI processor region.
    #[arg(long, env = "DOCUMENTAI_LOCATION", default_value = "us")]
    location: String,

    /// Document AI processor ID.
    #[arg(long, env = "DOCUMENTAI_PROCESSOR_ID")]
    processor: Option<String>,

    /// Override the Document AI base URL.
    #[arg(long, env = "DOCUMENTAI_ENDPOINT")]
    endpoint: Option<String>,

    /// OAuth2 bearer token.
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Directory backing file://bucket/key URIs.
    #[arg(long, env = "FINEXTRACT_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    /// Maximum pages per extraction call.
    #[arg(long, env = "FINEXTRACT_PAGES_PER_CHUNK", default_value_t = 15,
          value_parser = clap::value_parser!(u64).range(1..))]
    pages_per_chunk: u64,

    /// Number of concurrent extraction calls.
    #[arg(short, long, env = "FINEXTRACT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Retries per chunk on transient failures and timeouts.
    #[arg(long, env = "FINEXTRACT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call extraction timeout in seconds.
    #[arg(long, env = "FINEXTRACT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FINEXTRACT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to libpdfium, or a directory containing it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Print the final record (or inspection) as JSON instead of writing files.
    #[arg(long, env = "FINEXTRACT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FINEXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata and the chunk plan only.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FINEXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FINEXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let bytes = tokio::fs::read(&cli.input)
            .await
            .with_context(|| format!("Failed to read {}", cli.input))?;
        let report = inspect(bytes, &config).await.context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize metadata")?
            );
        } else {
            let meta = &report.metadata;
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            println!(
                "Chunks:       {} (≤{} pages each)",
                report.chunks.len(),
                report.pages_per_chunk
            );
            for (i, range) in report.chunks.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, range);
            }
        }
        return Ok(());
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let pipeline = Pipeline::connect(config, document_ai_config(&cli)?, storage_config(&cli))
        .context("Failed to set up pipeline")?;

    let is_blob = BlobUri::parse(&cli.input).is_ok();
    if is_blob {
        let processed = pipeline
            .process_uri(&cli.input)
            .await
            .context("Extraction failed")?;
        if cli.json {
            print_record(&processed.output)?;
        } else if !cli.quiet {
            summary(&processed.output, &processed.json_uri, &processed.csv_uri);
        }
    } else if cli.json {
        let bytes = tokio::fs::read(&cli.input)
            .await
            .with_context(|| format!("Failed to read {}", cli.input))?;
        let output = pipeline
            .extract_bytes(bytes)
            .await
            .context("Extraction failed")?;
        print_record(&output)?;
    } else {
        let written = pipeline
            .process_file(&cli.input, &cli.output_dir)
            .await
            .context("Extraction failed")?;
        if !cli.quiet {
            summary(
                &written.output,
                &written.json_path.display().to_string(),
                &written.csv_path.display().to_string(),
            );
        }
    }

    Ok(())
}

fn print_record(output: &ExtractionOutput) -> Result<()> {
    let json = fin_extract::pipeline::serialize::to_json(&output.record)
        .context("Failed to serialise record")?;
    println!("{json}");
    Ok(())
}

fn summary(output: &ExtractionOutput, json_at: &str, csv_at: &str) {
    let stats = &output.stats;
    eprintln!(
        "{}  {} pages  {} chunks  {}ms  →  {}, {}",
        green("✔"),
        stats.total_pages,
        stats.total_chunks,
        stats.total_duration_ms,
        bold(json_at),
        bold(csv_at),
    );
    eprintln!(
        "   {} entities  /  {} retries",
        dim(&stats.total_entities.to_string()),
        dim(&stats.total_retries.to_string()),
    );
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .pages_per_chunk(usize::try_from(cli.pages_per_chunk).context("--pages-per-chunk too large")?)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref location) = cli.output_location {
        builder = builder.output_location(location.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref path) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn document_ai_config(cli: &Cli) -> Result<DocumentAiConfig> {
    let project = cli
        .project
        .clone()
        .context("--project (DOCUMENTAI_PROJECT_ID) is required for extraction")?;
    let processor = cli
        .processor
        .clone()
        .context("--processor (DOCUMENTAI_PROCESSOR_ID) is required for extraction")?;

    let mut config = DocumentAiConfig::new(project, cli.location.clone(), processor);
    if let Some(ref endpoint) = cli.endpoint {
        config = config.with_endpoint(endpoint.clone());
    }
    if let Some(ref token) = cli.access_token {
        config = config.with_access_token(token.clone());
    }
    Ok(config)
}

fn storage_config(cli: &Cli) -> StorageConfig {
    StorageConfig {
        local_root: cli.local_root.clone(),
        gcs_endpoint: None,
        gcs_access_token: cli.access_token.clone(),
        memory_store: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["finextract", "report.pdf"]).unwrap();
        assert_eq!(cli.pages_per_chunk, 15);
        assert_eq!(cli.concurrency, 1);
        assert_eq!(cli.location, "us");
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.pages_per_chunk, 15);
    }

    #[test]
    fn zero_page_limit_is_rejected_by_clap() {
        assert!(Cli::try_parse_from(["finextract", "--pages-per-chunk", "0", "a.pdf"]).is_err());
    }

    #[test]
    fn extraction_requires_processor_ids() {
        let cli = Cli::try_parse_from(["finextract", "--project", "p", "a.pdf"]).unwrap();
        if std::env::var_os("DOCUMENTAI_PROCESSOR_ID").is_none() {
            assert!(document_ai_config(&cli).is_err());
        }
    }
}
