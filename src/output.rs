//! Data that flows between pipeline stages, and what a run hands back.

use crate::error::{DocReportError, SectionError};
use crate::sections::{SectionKind, SectionValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A page-range slice of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the chunk sequence.
    pub chunk_index: usize,
    /// Concatenated page texts, overlap pages included.
    pub text: String,
    pub job_id: String,
}

/// What the chunker hands to the fan-out.
///
/// A non-zero chunk size produces [`ChunkedDocument::Chunks`]; a chunk size of
/// zero leaves the pages as they are in [`ChunkedDocument::ByPage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChunkedDocument {
    Chunks {
        total_pages: usize,
        chunks: Vec<Chunk>,
    },
    ByPage {
        total_pages: usize,
        job_id: String,
        pages: Vec<String>,
    },
}

impl ChunkedDocument {
    pub fn total_pages(&self) -> usize {
        match self {
            ChunkedDocument::Chunks { total_pages, .. }
            | ChunkedDocument::ByPage { total_pages, .. } => *total_pages,
        }
    }

    pub fn is_in_chunks(&self) -> bool {
        matches!(self, ChunkedDocument::Chunks { .. })
    }

    pub fn is_by_page(&self) -> bool {
        matches!(self, ChunkedDocument::ByPage { .. })
    }

    /// The units the extractor runs over. In by-page mode each page is its own
    /// unit, indexed by page number.
    pub fn into_units(self) -> Vec<Chunk> {
        match self {
            ChunkedDocument::Chunks { chunks, .. } => chunks,
            ChunkedDocument::ByPage { job_id, pages, .. } => pages
                .into_iter()
                .enumerate()
                .map(|(chunk_index, text)| Chunk {
                    chunk_index,
                    text,
                    job_id: job_id.clone(),
                })
                .collect(),
        }
    }
}

/// One chunk's accepted extraction of one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionExtractionResult {
    pub section: SectionKind,
    pub chunk_index: usize,
    pub job_id: String,
    /// 0–100. Always above the configured threshold for forwarded results.
    pub confidence_level: u8,
    /// The model's "can I extract this" verdict.
    pub conclusion: bool,
    pub extracted_information: SectionValue,
    /// Free-text rationale. Diagnostic only.
    pub thinking: String,
}

/// Everything one chunk's extraction produced.
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub results: Vec<SectionExtractionResult>,
    /// Sections the model answered at or below the confidence threshold.
    pub dropped: Vec<SectionKind>,
    pub failures: Vec<SectionError>,
}

/// The fan-out barrier: every chunk has finished.
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    pub chunks_processed: usize,
    /// Accepted results in arrival order.
    pub results: Vec<SectionExtractionResult>,
    pub dropped: usize,
    pub failures: Vec<SectionError>,
}

impl FanOutResult {
    pub fn absorb(&mut self, outcome: ChunkOutcome) {
        self.chunks_processed += 1;
        self.dropped += outcome.dropped.len();
        self.results.extend(outcome.results);
        self.failures.extend(outcome.failures);
    }
}

/// The consolidated report: one value per section, in report order.
///
/// Serialises as a JSON object keyed by section name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Report {
    sections: BTreeMap<SectionKind, SectionValue>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: SectionValue) {
        self.sections.insert(value.kind(), value);
    }

    pub fn get(&self, kind: SectionKind) -> Option<&SectionValue> {
        self.sections.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Present sections in report order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionKind, &SectionValue)> {
        self.sections.iter().map(|(k, v)| (*k, v))
    }

    pub fn to_json_string(&self) -> Result<String, DocReportError> {
        serde_json::to_string(self)
            .map_err(|e| DocReportError::Internal(format!("report serialisation: {e}")))
    }

    /// Parse and validate a persisted report.
    ///
    /// Unknown section names and sections whose payload does not match their
    /// shape are both rejected.
    pub fn from_json_str(json: &str) -> Result<Self, DocReportError> {
        let raw: BTreeMap<String, Value> =
            serde_json::from_str(json).map_err(|e| DocReportError::ReportValidation {
                section: "<report>".into(),
                detail: e.to_string(),
            })?;

        let mut report = Report::new();
        for (name, payload) in raw {
            let kind: SectionKind = name.parse().map_err(|detail| {
                DocReportError::ReportValidation {
                    section: name.clone(),
                    detail,
                }
            })?;
            let value = SectionValue::from_json(kind, payload).map_err(|e| {
                DocReportError::ReportValidation {
                    section: name.clone(),
                    detail: e.to_string(),
                }
            })?;
            report.insert(value);
        }
        Ok(report)
    }
}

/// Counters and timings for one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub job_id: String,
    pub total_pages: usize,
    pub chunks_processed: usize,
    /// Results above the confidence threshold.
    pub sections_extracted: usize,
    /// Results at or below the threshold.
    pub sections_dropped: usize,
    pub section_failures: Vec<SectionError>,
    pub sections_consolidated: usize,
    pub report_key: Option<String>,
    pub chunking_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub consolidation_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}
