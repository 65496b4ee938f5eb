//! Progress-callback trait for pipeline and per-chunk events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages and as each chunk's
//! extraction finishes.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a broadcast channel, a database record or a
//! terminal progress bar without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because chunks are extracted
//! concurrently.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docreport::{AnalysisConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, chunk_index: usize, total_chunks: usize, accepted: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Chunk {}/{} done ({} sections)", chunk_index + 1, total_chunks, accepted);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::JobStatus;
use crate::sections::SectionKind;
use std::sync::Arc;

/// Called by the pipeline as it advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_chunk_start`, `on_chunk_complete`, `on_section_dropped` and
/// `on_chunk_error` may be called concurrently from different tasks.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once the document is chunked.
    ///
    /// # Arguments
    /// * `job_id`      : the job being processed
    /// * `total_pages` : pages in the source document
    /// * `total_chunks`: extraction units that will be processed
    fn on_pipeline_start(&self, job_id: &str, total_pages: usize, total_chunks: usize) {
        let _ = (job_id, total_pages, total_chunks);
    }

    /// Called whenever the job's status is advanced.
    fn on_stage(&self, job_id: &str, status: JobStatus) {
        let _ = (job_id, status);
    }

    /// Called before the first section of a chunk is extracted.
    ///
    /// `chunk_index` is zero-based.
    fn on_chunk_start(&self, chunk_index: usize, total_chunks: usize) {
        let _ = (chunk_index, total_chunks);
    }

    /// Called when every section of a chunk has been attempted.
    ///
    /// # Arguments
    /// * `accepted`: sections forwarded to consolidation from this chunk
    fn on_chunk_complete(&self, chunk_index: usize, total_chunks: usize, accepted: usize) {
        let _ = (chunk_index, total_chunks, accepted);
    }

    /// Called when a section answer falls at or below the confidence threshold.
    fn on_section_dropped(&self, chunk_index: usize, section: SectionKind, confidence: u8) {
        let _ = (chunk_index, section, confidence);
    }

    /// Called when a section fails for a chunk after all retries.
    fn on_chunk_error(&self, chunk_index: usize, section: SectionKind, error: &str) {
        let _ = (chunk_index, section, error);
    }

    /// Called after each section's candidates are merged.
    ///
    /// # Arguments
    /// * `candidates`: number of chunk results that were merged
    fn on_section_consolidated(&self, section: SectionKind, candidates: usize) {
        let _ = (section, candidates);
    }

    /// Called once after the report is rendered and the job completed.
    fn on_pipeline_complete(&self, job_id: &str, report_key: &str) {
        let _ = (job_id, report_key);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
