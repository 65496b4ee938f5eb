//! # edgequake-docreport
//!
//! Turn the page text of a long legal document (a company charter) into a
//! structured report with LLMs, then render that report as a PDF.
//!
//! ## Why this crate?
//!
//! A charter runs to dozens of pages and the facts a reader needs (who owns
//! the shares, who may sign for the company, which notary certified it) are
//! scattered across them. No single model call sees the whole document, and
//! any one call can misread a page. This crate asks a model about small page
//! windows, keeps only the answers it is confident in, and merges the
//! per-window answers so that repeated facts win and nothing is invented.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page text (from an upstream text-extraction job)
//!  │
//!  ├─ 1. Chunk        overlapping windows of `chunk_size` pages
//!  ├─ 2. Extract      per chunk × section structured call, confidence filter
//!  ├─ 3. Fan-out      up to `max_concurrency` chunks in flight, then a barrier
//!  ├─ 4. Consolidate  per section: merge candidates, ground against them
//!  ├─ 5. Persist      report JSON on the job record
//!  └─ 6. Render       one PDF page per section, uploaded to blob storage
//! ```
//!
//! The job record's status follows every step; see [`job::JobStatus`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use edgequake_docreport::{AnalysisConfig, FsBlobStore, FileJobStore, PipelineOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = AnalysisConfig::builder().chunk_size(5).page_overlap(1).build()?;
//!     let orchestrator = PipelineOrchestrator::from_config(
//!         config,
//!         Arc::new(FileJobStore::new("out/jobs")),
//!         Arc::new(FsBlobStore::new("out/reports")),
//!     )
//!     .await?;
//!     let summary = orchestrator.analyze("charter.json", None, None).await?;
//!     println!("report: {:?}", summary.report_key);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docreport` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docreport = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod sections;
pub mod store;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnalysisConfig, AnalysisConfigBuilder, ConsolidationStrategy};
pub use error::{DocReportError, LlmCallError, SectionError};
pub use job::{Job, JobStatus, JobUpdate};
pub use orchestrator::{respond, PipelineOrchestrator, StageResponse};
pub use output::{Chunk, ChunkedDocument, Report, RunSummary, SectionExtractionResult};
pub use pipeline::llm::{StructuredLlm, StructuredRequest};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use prompts::Language;
pub use retry::RetryPolicy;
pub use sections::{SectionKind, SectionValue};
pub use store::{BlobStore, FileJobStore, FsBlobStore, InMemoryBlobStore, InMemoryJobStore, JobStore};
pub use stream::extract_stream;
