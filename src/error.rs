//! Error types for the edgequake-docreport library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`DocReportError`] (**Fatal for the job**): the pipeline cannot produce a
//!   trustworthy report (job missing, fan-in pooled two jobs, store write
//!   failed, consolidated report does not validate). The orchestrator marks
//!   the job `ERROR` and stops.
//!
//! * [`SectionError`] (**Non-fatal**): one section could not be extracted from
//!   one chunk (retries exhausted, malformed structured output). The chunk's
//!   other sections and all other chunks carry on; the report is simply
//!   emptier than ideal.
//!
//! * [`LlmCallError`] (**Call-site**): the raw outcome of a single LLM request.
//!   [`crate::retry::RetryPolicy`] inspects it to decide whether another
//!   attempt is worthwhile.

use crate::job::JobStatus;
use crate::sections::SectionKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docreport library.
#[derive(Debug, Error)]
pub enum DocReportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Page-text document was not found at the given path.
    #[error("Page-text document not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The input could not be interpreted as a page-text document.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upstream text-extraction job did not succeed.
    #[error("Text extraction for job '{job_id}' finished with status {status}")]
    TextExtractionFailed { job_id: String, status: String },

    // ── Job errors ────────────────────────────────────────────────────────
    /// No job record exists for this id.
    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    /// The job exists but no consolidated report has been persisted yet.
    #[error("Job '{job_id}' has no persisted report")]
    ReportMissing { job_id: String },

    /// Fan-in received results from more than one job.
    #[error("All elements must have the same job_id: expected '{expected}', found '{found}'")]
    JobIdMismatch { expected: String, found: String },

    /// A status update tried to move the job backwards.
    #[error("Job '{job_id}' cannot move from {from} to {to}")]
    InvalidStatusTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Extraction hit a provider error that retrying cannot fix.
    #[error("Extraction of {section} from chunk {chunk_index} failed: {detail}")]
    ExtractionFailed {
        section: SectionKind,
        chunk_index: usize,
        detail: String,
    },

    /// Consolidating a section failed (retries exhausted or hard error).
    #[error("Consolidation of {section} failed after {attempts} attempt(s): {detail}")]
    ConsolidationFailed {
        section: SectionKind,
        attempts: u32,
        detail: String,
    },

    /// A consolidated or persisted section does not match its schema.
    #[error("Report section {section} failed validation: {detail}")]
    ReportValidation { section: String, detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The job store rejected a read or write.
    #[error("Job store error for '{job_id}': {detail}")]
    Persistence { job_id: String, detail: String },

    /// Blob storage upload/download failed.
    #[error("Blob storage error for key '{key}': {detail}")]
    Storage { key: String, detail: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// Building or encoding the PDF failed.
    #[error("Report rendering failed: {0}")]
    Render(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocReportError {
    /// Short machine-readable code used in stage responses.
    pub fn code(&self) -> &'static str {
        match self {
            DocReportError::FileNotFound { .. }
            | DocReportError::InvalidInput { .. }
            | DocReportError::DownloadFailed { .. }
            | DocReportError::DownloadTimeout { .. } => "INPUT",
            DocReportError::TextExtractionFailed { .. } => "TEXT_EXTRACTION",
            DocReportError::JobNotFound { .. } | DocReportError::ReportMissing { .. } => {
                "NOT_FOUND"
            }
            DocReportError::JobIdMismatch { .. } => "CONSISTENCY",
            DocReportError::InvalidStatusTransition { .. } => "STATUS",
            DocReportError::ProviderNotConfigured { .. } => "PROVIDER",
            DocReportError::ExtractionFailed { .. } | DocReportError::ConsolidationFailed { .. } => {
                "LLM"
            }
            DocReportError::ReportValidation { .. } => "VALIDATION",
            DocReportError::Persistence { .. } | DocReportError::Storage { .. } => "PERSISTENCE",
            DocReportError::Render(_) => "RENDER",
            DocReportError::InvalidConfig(_) => "CONFIG",
            DocReportError::Internal(_) => "INTERNAL",
        }
    }
}

/// A non-fatal error for one section of one chunk.
///
/// Recorded in [`crate::output::RunSummary`]; the job continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum SectionError {
    /// Transient provider errors persisted through every attempt.
    #[error("Chunk {chunk_index}: {section} extraction gave up after {attempts} attempt(s): {detail}")]
    RetriesExhausted {
        chunk_index: usize,
        section: SectionKind,
        attempts: u32,
        detail: String,
    },

    /// The structured output did not match the section's schema.
    #[error("Chunk {chunk_index}: {section} output failed validation: {detail}")]
    Validation {
        chunk_index: usize,
        section: SectionKind,
        detail: String,
    },
}

/// Outcome of a single structured LLM request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmCallError {
    /// Provider rate limiting (HTTP 429, `ThrottlingException`).
    #[error("throttled: {0}")]
    Throttled(String),

    /// The model or the request timed out.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The response arrived but is not a valid object for the schema.
    #[error("invalid structured output: {0}")]
    InvalidOutput(String),

    /// Any other provider failure (auth, bad request, …).
    #[error("provider error: {0}")]
    Provider(String),
}

impl LlmCallError {
    /// Classify a provider error message.
    ///
    /// Providers surface rate limits and timeouts in many shapes, so matching
    /// on the rendered message is the only portable signal.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("ratelimit")
            || lower.contains("throttl")
            || lower.contains("too many requests")
        {
            LlmCallError::Throttled(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            LlmCallError::Timeout(message)
        } else {
            LlmCallError::Provider(message)
        }
    }

    /// Transient errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmCallError::Throttled(_) | LlmCallError::Timeout(_))
    }
}
