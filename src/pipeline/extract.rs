//! Section extraction: ask the model for one report section from one chunk.
//!
//! Each call returns an envelope
//! `{ thinking, confidence_level, conclusion, extracted_information }`. The
//! extractor keeps the result only when `confidence_level` is strictly above
//! the configured threshold, then validates `extracted_information` against
//! the section's shape.
//!
//! ## Failure scopes
//!
//! | What happened | Outcome |
//! |---------------|---------|
//! | confidence at or below threshold | [`SectionOutcome::Dropped`] |
//! | unparseable output, shape mismatch | [`SectionOutcome::Failed`] with [`SectionError::Validation`] |
//! | throttling/timeouts outlast the retry budget | [`SectionOutcome::Failed`] with [`SectionError::RetriesExhausted`] |
//! | any other provider error | `Err(DocReportError::ExtractionFailed)` |

use crate::config::AnalysisConfig;
use crate::error::{DocReportError, LlmCallError, SectionError};
use crate::output::{Chunk, ChunkOutcome, SectionExtractionResult};
use crate::pipeline::llm::{StructuredLlm, StructuredRequest};
use crate::progress::ProgressCallback;
use crate::prompts::{self, Language, PromptSet};
use crate::retry::RetryPolicy;
use crate::sections::{SectionKind, SectionValue};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one (chunk, section) extraction produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionOutcome {
    Accepted(SectionExtractionResult),
    /// The model answered, but not confidently enough.
    Dropped { confidence: u8 },
    Failed(SectionError),
}

// ── Few-shot examples ────────────────────────────────────────────────────

/// Few-shot examples per section, loaded from
/// `<root>/<language>/<section>/*.txt` in file-name order.
#[derive(Debug, Clone, Default)]
pub struct ExampleLibrary {
    by_section: HashMap<SectionKind, Vec<String>>,
}

impl ExampleLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub async fn load(root: &Path, language: Language) -> Result<Self, DocReportError> {
        let mut by_section = HashMap::new();
        for section in SectionKind::ALL {
            let dir = root.join(language.code()).join(section.as_str());
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("No examples for {} in {}", section, dir.display());
                    continue;
                }
                Err(e) => {
                    return Err(DocReportError::InvalidInput {
                        input: dir.display().to_string(),
                        reason: e.to_string(),
                    })
                }
            };

            let mut files = Vec::new();
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                DocReportError::InvalidInput {
                    input: dir.display().to_string(),
                    reason: e.to_string(),
                }
            })? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("txt") {
                    files.push(path);
                }
            }
            files.sort();

            let mut examples = Vec::with_capacity(files.len());
            for path in files {
                let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    DocReportError::InvalidInput {
                        input: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                examples.push(text);
            }
            by_section.insert(section, examples);
        }
        Ok(Self { by_section })
    }

    pub fn for_section(&self, section: SectionKind) -> &[String] {
        self.by_section
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn insert(&mut self, section: SectionKind, examples: Vec<String>) {
        self.by_section.insert(section, examples);
    }
}

// ── Extractor ────────────────────────────────────────────────────────────

/// Extracts report sections from chunks with a structured-output model.
#[derive(Clone)]
pub struct SectionExtractor {
    llm: Arc<dyn StructuredLlm>,
    prompts: &'static PromptSet,
    examples: Arc<ExampleLibrary>,
    threshold: u8,
    use_examples: bool,
    retry: RetryPolicy,
    timeout: Duration,
    progress: Option<ProgressCallback>,
}

impl SectionExtractor {
    pub fn new(llm: Arc<dyn StructuredLlm>, config: &AnalysisConfig, examples: Arc<ExampleLibrary>) -> Self {
        Self {
            llm,
            prompts: config.prompts(),
            examples,
            threshold: config.confidence_threshold,
            use_examples: config.use_examples,
            retry: config.retry,
            timeout: config.extraction_timeout(),
            progress: config.progress_callback.clone(),
        }
    }

    /// Extract one section from one chunk.
    pub async fn extract(
        &self,
        chunk: &Chunk,
        section: SectionKind,
        use_examples: bool,
    ) -> Result<SectionOutcome, DocReportError> {
        let examples: &[String] = if use_examples {
            self.examples.for_section(section)
        } else {
            &[]
        };
        if examples.is_empty() {
            info!("Chunk {}: extracting {} without examples", chunk.chunk_index, section);
        } else {
            info!(
                "Chunk {}: extracting {} with {} examples",
                chunk.chunk_index,
                section,
                examples.len()
            );
        }

        let schema = section.json_schema().to_string();
        let (system, user) =
            prompts::render_extraction(self.prompts, section.as_str(), &schema, &chunk.text, examples);
        let request = StructuredRequest {
            label: format!("chunk {} / {}", chunk.chunk_index, section),
            system,
            user,
        };

        let raw = match self
            .retry
            .run(&request.label, Some(self.timeout), |_| self.llm.complete_json(&request))
            .await
        {
            Ok(v) => v,
            Err(failure) => {
                return match failure.last_error {
                    LlmCallError::InvalidOutput(detail) => {
                        warn!("{}: unusable output: {}", request.label, detail);
                        Ok(SectionOutcome::Failed(SectionError::Validation {
                            chunk_index: chunk.chunk_index,
                            section,
                            detail,
                        }))
                    }
                    err if failure.exhausted => {
                        warn!(
                            "{}: giving up after {} attempts: {}",
                            request.label, failure.attempts, err
                        );
                        Ok(SectionOutcome::Failed(SectionError::RetriesExhausted {
                            chunk_index: chunk.chunk_index,
                            section,
                            attempts: failure.attempts,
                            detail: err.to_string(),
                        }))
                    }
                    err => Err(DocReportError::ExtractionFailed {
                        section,
                        chunk_index: chunk.chunk_index,
                        detail: err.to_string(),
                    }),
                };
            }
        };

        Ok(self.interpret(chunk, section, raw))
    }

    /// Apply the confidence threshold, then validate the payload.
    fn interpret(&self, chunk: &Chunk, section: SectionKind, raw: Value) -> SectionOutcome {
        let level = confidence_of(&raw);
        let confidence = level.round() as u8;
        let thinking = raw
            .get("thinking")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        debug!(
            "Chunk {}: {} confidence {} ({})",
            chunk.chunk_index, section, level, thinking
        );

        if level <= f64::from(self.threshold) {
            info!(
                "Chunk {}: dropping {} (confidence {} <= {})",
                chunk.chunk_index, section, level, self.threshold
            );
            return SectionOutcome::Dropped { confidence };
        }

        let payload = raw
            .get("extracted_information")
            .cloned()
            .unwrap_or(Value::Null);
        match SectionValue::from_json(section, payload) {
            Ok(value) => SectionOutcome::Accepted(SectionExtractionResult {
                section,
                chunk_index: chunk.chunk_index,
                job_id: chunk.job_id.clone(),
                confidence_level: confidence,
                conclusion: raw.get("conclusion").and_then(Value::as_bool).unwrap_or(false),
                extracted_information: value,
                thinking,
            }),
            Err(e) => {
                warn!(
                    "Chunk {}: {} failed validation: {}",
                    chunk.chunk_index, section, e
                );
                SectionOutcome::Failed(SectionError::Validation {
                    chunk_index: chunk.chunk_index,
                    section,
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Extract every section from one chunk, one section at a time.
    pub async fn extract_chunk(&self, chunk: &Chunk) -> Result<ChunkOutcome, DocReportError> {
        let mut outcome = ChunkOutcome {
            chunk_index: chunk.chunk_index,
            ..Default::default()
        };

        for section in SectionKind::ALL {
            match self.extract(chunk, section, self.use_examples).await? {
                SectionOutcome::Accepted(result) => outcome.results.push(result),
                SectionOutcome::Dropped { confidence } => {
                    if let Some(ref cb) = self.progress {
                        cb.on_section_dropped(chunk.chunk_index, section, confidence);
                    }
                    outcome.dropped.push(section);
                }
                SectionOutcome::Failed(err) => {
                    if let Some(ref cb) = self.progress {
                        cb.on_chunk_error(chunk.chunk_index, section, &err.to_string());
                    }
                    outcome.failures.push(err);
                }
            }
        }
        Ok(outcome)
    }
}

/// Read `confidence_level` leniently (number or numeric string), clamped to 0–100.
fn confidence_of(raw: &Value) -> f64 {
    let level = match raw.get("confidence_level") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if level.is_nan() {
        return 0.0;
    }
    level.clamp(0.0, 100.0)
}
