//! The job record and its status state machine.
//!
//! A [`Job`] is the only shared mutable record in a pipeline run. Every stage
//! advances its [`JobStatus`]; the store refuses updates that would move the
//! status backwards, so concurrent chunk workers re-writing
//! `INFORMATION_EXTRACTION` are harmless while a late writer can never undo a
//! finished stage.
//!
//! ```text
//! TEXT_EXTRACTION → PAGE_CHUNKING → INFORMATION_EXTRACTION
//!   → INFORMATION_CONSOLIDATION → REPORT_PERSISTED → PDF_GENERATION → COMPLETED
//!
//! any non-terminal state → ERROR
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a job currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    TextExtraction,
    PageChunking,
    InformationExtraction,
    InformationConsolidation,
    /// The consolidated report is stored on the job (`json_report` set).
    ReportPersisted,
    /// The renderer has picked the job up.
    PdfGeneration,
    /// The rendered report is uploaded and `report_key` is set.
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::TextExtraction => "TEXT_EXTRACTION",
            JobStatus::PageChunking => "PAGE_CHUNKING",
            JobStatus::InformationExtraction => "INFORMATION_EXTRACTION",
            JobStatus::InformationConsolidation => "INFORMATION_CONSOLIDATION",
            JobStatus::ReportPersisted => "REPORT_PERSISTED",
            JobStatus::PdfGeneration => "PDF_GENERATION",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Error => "ERROR",
        }
    }

    /// Position in the forward chain. `None` for `ERROR`.
    fn rank(&self) -> Option<u8> {
        match self {
            JobStatus::TextExtraction => Some(0),
            JobStatus::PageChunking => Some(1),
            JobStatus::InformationExtraction => Some(2),
            JobStatus::InformationConsolidation => Some(3),
            JobStatus::ReportPersisted => Some(4),
            JobStatus::PdfGeneration => Some(5),
            JobStatus::Completed => Some(6),
            JobStatus::Error => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether a job in `self` may be written with status `next`.
    ///
    /// Re-writing the current status is allowed (chunk workers do it once
    /// each). Skipping forward is allowed. `ERROR` is reachable from every
    /// non-terminal state. Terminal states accept only themselves.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document-analysis run, keyed by the upstream extraction job's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// The job id, supplied by the upstream text-extraction job.
    pub id: String,
    pub document_name: String,
    /// Where the source document lives.
    pub document_key: String,
    pub status: JobStatus,
    /// Blob key of the rendered report, once rendering completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_key: Option<String>,
    /// The serialised consolidated report, once persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_report: Option<String>,
}

impl Job {
    /// A fresh job, as written when the upstream extraction starts.
    pub fn new(
        id: impl Into<String>,
        document_name: impl Into<String>,
        document_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_name: document_name.into(),
            document_key: document_key.into(),
            status: JobStatus::TextExtraction,
            report_key: None,
            json_report: None,
        }
    }
}

/// A partial update applied to a stored job.
///
/// Fields left `None` are untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub report_key: Option<String>,
    pub json_report: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_json_report(mut self, report: impl Into<String>) -> Self {
        self.json_report = Some(report.into());
        self
    }

    pub fn with_report_key(mut self, key: impl Into<String>) -> Self {
        self.report_key = Some(key.into());
        self
    }
}
