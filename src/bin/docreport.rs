//! CLI binary for edgequake-docreport.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, runs one job against filesystem-backed stores, and
//! prints the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docreport::{
    respond, AnalysisConfig, ConsolidationStrategy, DocReportError, FileJobStore, FsBlobStore,
    JobStatus, JobStore, Language, PipelineOrchestrator, PipelineProgressCallback, ProgressCallback, RetryPolicy,
    RunSummary, SectionKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

/// Terminal progress: a spinner until the document is chunked, then a bar
/// counting chunks. Chunks complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading page text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, job_id: &str, total_pages: usize, total_chunks: usize) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Job {job_id}: {total_pages} pages in {total_chunks} chunks"
            ))
        ));
    }

    fn on_stage(&self, _job_id: &str, status: JobStatus) {
        match status {
            JobStatus::InformationConsolidation => self.bar.set_prefix("Consolidating"),
            JobStatus::PdfGeneration => self.bar.set_prefix("Rendering"),
            _ => {}
        }
        self.bar.set_message(status.to_string());
    }

    fn on_chunk_complete(&self, chunk_index: usize, total_chunks: usize, accepted: usize) {
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}",
            green("✓"),
            chunk_index + 1,
            total_chunks,
            dim(&format!("{accepted} sections kept")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk_index: usize, section: SectionKind, error: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}  {:<22} {}",
            red("✗"),
            chunk_index + 1,
            section.as_str(),
            red(&msg),
        ));
    }

    fn on_section_consolidated(&self, section: SectionKind, candidates: usize) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            cyan("◇"),
            section.as_str(),
            dim(&format!("merged from {candidates} candidates")),
        ));
    }

    fn on_pipeline_complete(&self, _job_id: &str, report_key: &str) {
        self.bar.finish_and_clear();
        let failures = self.failures.load(Ordering::SeqCst);
        if failures == 0 {
            eprintln!("{} report rendered: {}", green("✔"), bold(report_key));
        } else {
            eprintln!(
                "{} report rendered: {}  ({} section extractions failed)",
                cyan("⚠"),
                bold(report_key),
                red(&failures.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a page-text document (JSON {"pages": [...]}, JSON array, or form-feed text)
  docreport charter.json

  # Spanish charter, five pages per chunk, one page overlap
  docreport --language es --chunk-size 5 --page-overlap 1 acta.txt

  # Reuse the upstream extraction job id and write stores under ./out
  docreport --job-id 3f2a... --out-dir out charter.json

  # Merge candidates without a second model pass
  docreport --offline-consolidation charter.json

  # Query jobs
  docreport --out-dir out --list-jobs
  docreport --out-dir out --show-job 3f2a...

OUTPUT LAYOUT (--out-dir):
  <out-dir>/jobs/<job_id>.json             job record (status, json_report, report_key)
  <out-dir>/reports/<uuid>/<report-file>   rendered PDF report

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PAGE_CHUNK_SIZE         Pages per chunk
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract a structured report from a long document's page text.
#[derive(Parser, Debug)]
#[command(
    name = "docreport",
    version,
    about = "Extract a structured report from a multipage document using LLMs",
    long_about = "Chunk the page text of a long document (a company charter), extract report \
sections from every chunk with an LLM, consolidate them per section, and render a PDF report. \
Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local path or HTTP/HTTPS URL of the extracted page text.
    #[arg(required_unless_present_any = ["list_jobs", "show_job"])]
    input: Option<String>,

    /// Job id. Defaults to the id recorded in the document, then a new UUID.
    #[arg(long, env = "DOCREPORT_JOB_ID")]
    job_id: Option<String>,

    /// Document name stored on the job.
    #[arg(long)]
    document_name: Option<String>,

    /// Directory holding the job store and rendered reports.
    #[arg(long, env = "DOCREPORT_OUT_DIR", default_value = "docreport-out")]
    out_dir: PathBuf,

    /// Pages per chunk (0 = one page per extraction unit).
    #[arg(long, env = "PAGE_CHUNK_SIZE", default_value_t = 5)]
    chunk_size: usize,

    /// Pages repeated from the previous chunk.
    #[arg(long, env = "DOCREPORT_PAGE_OVERLAP", default_value_t = 1)]
    page_overlap: usize,

    /// Chunks extracted concurrently.
    #[arg(short, long, env = "DOCREPORT_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Keep extractions whose confidence is strictly above this (0–100).
    #[arg(long, env = "EXTRACTION_CONFIDENCE_LEVEL", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: u8,

    /// Document language: en, es.
    #[arg(long, env = "DOCREPORT_LANGUAGE", value_enum, default_value = "en")]
    language: LanguageArg,

    /// LLM model ID for extraction (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM model ID for consolidation. Defaults to --model.
    #[arg(long, env = "DOCREPORT_CONSOLIDATION_MODEL")]
    consolidation_model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Include few-shot examples in extraction prompts.
    #[arg(long, env = "DOCREPORT_USE_EXAMPLES")]
    examples: bool,

    /// Few-shot examples root: <dir>/<language>/<section>/*.txt.
    #[arg(long, env = "DOCREPORT_EXAMPLES_DIR", default_value = "prompt_examples")]
    examples_dir: PathBuf,

    /// Merge section candidates by vote instead of a model call.
    #[arg(long, env = "DOCREPORT_OFFLINE_CONSOLIDATION")]
    offline_consolidation: bool,

    /// Max LLM output tokens per call.
    #[arg(long, env = "DOCREPORT_MAX_TOKENS", default_value_t = 1500)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "DOCREPORT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Attempts per LLM call on throttling or timeout.
    #[arg(long, env = "DOCREPORT_MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,

    /// Per-attempt extraction timeout in seconds.
    #[arg(long, env = "DOCREPORT_EXTRACTION_TIMEOUT", default_value_t = 900)]
    extraction_timeout: u64,

    /// Per-attempt consolidation timeout in seconds.
    #[arg(long, env = "DOCREPORT_CONSOLIDATION_TIMEOUT", default_value_t = 300)]
    consolidation_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCREPORT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Title on the first report page.
    #[arg(long, env = "DOCREPORT_TITLE")]
    title: Option<String>,

    /// Character budget of one rendered table cell.
    #[arg(long, env = "DOCREPORT_CELL_MAX_CHARS", default_value_t = 250)]
    cell_max_chars: usize,

    /// File name of the rendered report.
    #[arg(long, env = "DOCREPORT_REPORT_FILENAME", default_value = "document_report.pdf")]
    report_filename: String,

    /// Print the status of one job and exit.
    #[arg(long, value_name = "JOB_ID")]
    show_job: Option<String>,

    /// List every job in the store and exit.
    #[arg(long)]
    list_jobs: bool,

    /// Print the run summary as JSON.
    #[arg(long, env = "DOCREPORT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCREPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCREPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCREPORT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LanguageArg {
    En,
    Es,
}

impl From<LanguageArg> for Language {
    fn from(v: LanguageArg) -> Self {
        match v {
            LanguageArg::En => Language::En,
            LanguageArg::Es => Language::Es,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the progress bar is active.
    let querying = cli.list_jobs || cli.show_job.is_some();
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !querying;
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

    let jobs = Arc::new(FileJobStore::new(cli.out_dir.join("jobs")));
    let blobs = Arc::new(FsBlobStore::new(cli.out_dir.join("reports")));

    // ── Query modes ──────────────────────────────────────────────────────
    if cli.list_jobs {
        let all = jobs
            .list()
            .await
            .context("Failed to list jobs")?;
        if cli.json {
            let responses: Vec<_> = all.iter().map(|j| respond(&j.id, Ok(j))).collect();
            println!("{}", serde_json::to_string_pretty(&responses)?);
        } else {
            for job in all {
                println!(
                    "{:<38} {:<26} {}",
                    job.id,
                    job.status.as_str(),
                    job.report_key.as_deref().unwrap_or("-")
                );
            }
        }
        return Ok(());
    }

    if let Some(ref job_id) = cli.show_job {
        let job = jobs
            .get(job_id)
            .await
            .context("Failed to read job")?;
        let response = match job {
            Some(ref job) => respond(job_id, Ok(job)),
            None => respond(
                job_id,
                Err(&DocReportError::JobNotFound {
                    job_id: job_id.clone(),
                }),
            ),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let input = cli
        .input
        .as_deref()
        .context("An input document is required")?;
    let orchestrator = PipelineOrchestrator::from_config(config, jobs, blobs.clone())
        .await
        .context("Failed to initialise the pipeline")?;
    let summary = orchestrator
        .analyze(input, cli.job_id.as_deref(), cli.document_name.as_deref())
        .await
        .context("Analysis failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !cli.quiet {
        print_summary(&summary, &blobs);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, blobs: &FsBlobStore) {
    let location = summary
        .report_key
        .as_deref()
        .and_then(|key| blobs.path_for(key).ok())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());

    eprintln!(
        "{}  job {}  {} pages  {} chunks  {}ms  →  {}",
        if summary.section_failures.is_empty() {
            green("✔")
        } else {
            cyan("⚠")
        },
        summary.job_id,
        summary.total_pages,
        summary.chunks_processed,
        summary.total_duration_ms,
        bold(&location),
    );
    eprintln!(
        "   {} sections kept  /  {} dropped  /  {} failed  →  {} in report",
        dim(&summary.sections_extracted.to_string()),
        dim(&summary.sections_dropped.to_string()),
        dim(&summary.section_failures.len().to_string()),
        dim(&summary.sections_consolidated.to_string()),
    );
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let retry = RetryPolicy {
        max_attempts: cli.max_attempts,
        ..RetryPolicy::default()
    };
    let strategy = if cli.offline_consolidation {
        ConsolidationStrategy::Vote
    } else {
        ConsolidationStrategy::Llm
    };

    let mut builder = AnalysisConfig::builder()
        .chunk_size(cli.chunk_size)
        .page_overlap(cli.page_overlap)
        .max_concurrency(cli.concurrency)
        .confidence_threshold(cli.threshold)
        .language(cli.language.into())
        .use_examples(cli.examples)
        .examples_dir(cli.examples_dir.clone())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .retry(retry)
        .extraction_timeout_secs(cli.extraction_timeout)
        .consolidation_timeout_secs(cli.consolidation_timeout)
        .download_timeout_secs(cli.download_timeout)
        .consolidation_strategy(strategy)
        .cell_max_chars(cli.cell_max_chars)
        .report_filename(cli.report_filename.clone());

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref model) = cli.consolidation_model {
        builder = builder.consolidation_model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref title) = cli.title {
        builder = builder.report_title(title.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
