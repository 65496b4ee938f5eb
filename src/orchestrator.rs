//! Pipeline orchestration: drive one job through every stage and keep its
//! status current.
//!
//! ```text
//! start_job ─▶ TEXT_EXTRACTION
//!   extraction event (SUCCEEDED) + page text
//!   chunk        ─▶ PAGE_CHUNKING
//!   fan-out      ─▶ INFORMATION_EXTRACTION   (re-written once per chunk)
//!   consolidate  ─▶ INFORMATION_CONSOLIDATION
//!   persist      ─▶ REPORT_PERSISTED
//!   render       ─▶ PDF_GENERATION
//!   record key   ─▶ COMPLETED
//! ```
//!
//! A fatal error at any stage marks the job `ERROR` and stops the run. No
//! stage is retried here; retries live at the individual model calls.
//!
//! Every collaborator (model clients, job store, blob store) is handed in at
//! construction, so tests run the whole pipeline against fakes.

use crate::config::AnalysisConfig;
use crate::error::DocReportError;
use crate::job::{Job, JobStatus};
use crate::output::RunSummary;
use crate::pipeline::consolidate::SectionConsolidator;
use crate::pipeline::extract::{ExampleLibrary, SectionExtractor};
use crate::pipeline::input::{self, ExtractionEvent};
use crate::pipeline::llm::{self, StructuredLlm};
use crate::pipeline::render::ReportRenderer;
use crate::pipeline::{chunk, fanout, persist};
use crate::store::{self, BlobStore, JobStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Drives jobs through the analysis pipeline.
pub struct PipelineOrchestrator {
    config: AnalysisConfig,
    extraction_llm: Arc<dyn StructuredLlm>,
    consolidation_llm: Arc<dyn StructuredLlm>,
    jobs: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    examples: Arc<ExampleLibrary>,
}

impl PipelineOrchestrator {
    /// Assemble an orchestrator from explicit collaborators.
    pub fn new(
        config: AnalysisConfig,
        extraction_llm: Arc<dyn StructuredLlm>,
        consolidation_llm: Arc<dyn StructuredLlm>,
        jobs: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            extraction_llm,
            consolidation_llm,
            jobs,
            blobs,
            examples: Arc::new(ExampleLibrary::empty()),
        }
    }

    /// Resolve the model clients from `config` and load few-shot examples
    /// when `use_examples` is set.
    pub async fn from_config(
        config: AnalysisConfig,
        jobs: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, DocReportError> {
        let (extraction, consolidation) = llm::build_clients(&config)?;
        let examples = if config.use_examples {
            ExampleLibrary::load(&config.examples_dir, config.language).await?
        } else {
            ExampleLibrary::empty()
        };
        Ok(Self::new(config, extraction, consolidation, jobs, blobs).with_examples(examples))
    }

    pub fn with_examples(mut self, examples: ExampleLibrary) -> Self {
        self.examples = Arc::new(examples);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    // ── Job lifecycle ────────────────────────────────────────────────────

    /// Record a new job in `TEXT_EXTRACTION`, as the upstream text
    /// extraction starts.
    pub async fn start_job(
        &self,
        job_id: &str,
        document_name: &str,
        document_key: &str,
    ) -> Result<Job, DocReportError> {
        let job = Job::new(job_id, document_name, document_key);
        self.jobs.put(job.clone()).await?;
        info!("Job {}: started for '{}'", job_id, document_name);
        self.notify_stage(job_id, JobStatus::TextExtraction);
        Ok(job)
    }

    /// Handle a batch of extraction-completed messages; the last one wins.
    ///
    /// A status other than `SUCCEEDED` marks the job `ERROR` and returns
    /// [`DocReportError::TextExtractionFailed`].
    pub async fn on_extraction_event<S: AsRef<str>>(
        &self,
        messages: &[S],
    ) -> Result<ExtractionEvent, DocReportError> {
        let event = ExtractionEvent::last_of(messages)?;
        if event.succeeded() {
            info!("Job {}: text extraction succeeded", event.job_id);
            return Ok(event);
        }

        let err = DocReportError::TextExtractionFailed {
            job_id: event.job_id.clone(),
            status: event.status.clone(),
        };
        self.mark_failed(&event.job_id, &err).await;
        Err(err)
    }

    /// Load page text from `input`, create the job if needed, and run it.
    ///
    /// The job id is taken from `job_id`, then from the document itself, and
    /// is generated otherwise.
    pub async fn analyze(
        &self,
        input: &str,
        job_id: Option<&str>,
        document_name: Option<&str>,
    ) -> Result<RunSummary, DocReportError> {
        let doc = input::load_document(input, self.config.download_timeout_secs).await?;
        let job_id = job_id
            .map(str::to_string)
            .or_else(|| doc.job_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = document_name
            .map(str::to_string)
            .or_else(|| doc.document_name.clone())
            .unwrap_or_else(|| input.to_string());

        if self.jobs.get(&job_id).await?.is_none() {
            self.start_job(&job_id, &name, input).await?;
        }
        self.run(&job_id, &doc.pages).await
    }

    /// Run every stage after text extraction for an existing job.
    ///
    /// On failure the job is marked `ERROR` before the error is returned.
    pub async fn run(&self, job_id: &str, pages: &[String]) -> Result<RunSummary, DocReportError> {
        match self.run_stages(job_id, pages).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.mark_failed(job_id, &err).await;
                Err(err)
            }
        }
    }

    async fn run_stages(&self, job_id: &str, pages: &[String]) -> Result<RunSummary, DocReportError> {
        let total_start = Instant::now();
        let progress = self.config.progress_callback.clone();
        store::require_job(self.jobs.as_ref(), job_id).await?;

        // ── Stage 1: Chunk ───────────────────────────────────────────────
        let chunk_start = Instant::now();
        let chunked = chunk::chunk(job_id, pages, self.config.chunk_size, self.config.page_overlap);
        let total_pages = chunked.total_pages();
        let units = chunked.into_units();
        self.advance(job_id, JobStatus::PageChunking).await?;
        let chunking_duration_ms = chunk_start.elapsed().as_millis() as u64;
        if let Some(ref cb) = progress {
            cb.on_pipeline_start(job_id, total_pages, units.len());
        }

        // ── Stage 2: Fan out extraction ──────────────────────────────────
        let extraction_start = Instant::now();
        let extractor = SectionExtractor::new(
            Arc::clone(&self.extraction_llm),
            &self.config,
            Arc::clone(&self.examples),
        );
        let fanned = fanout::run(
            &extractor,
            Arc::clone(&self.jobs),
            units,
            self.config.max_concurrency,
            progress.clone(),
        )
        .await?;
        let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

        // ── Stage 3: Consolidate ─────────────────────────────────────────
        let consolidation_start = Instant::now();
        let consolidator = SectionConsolidator::new(Arc::clone(&self.consolidation_llm), &self.config);
        let sections_extracted = fanned.results.len();
        let report = consolidator.consolidate_report(job_id, fanned.results).await?;
        self.advance(job_id, JobStatus::InformationConsolidation).await?;
        let consolidation_duration_ms = consolidation_start.elapsed().as_millis() as u64;

        // ── Stage 4: Persist ─────────────────────────────────────────────
        persist::persist(self.jobs.as_ref(), job_id, &report).await?;
        self.notify_stage(job_id, JobStatus::ReportPersisted);

        // ── Stage 5: Render and record ───────────────────────────────────
        let render_start = Instant::now();
        let renderer = ReportRenderer::new(Arc::clone(&self.blobs), &self.config);
        let report_key = renderer.render(self.jobs.as_ref(), job_id).await?;
        self.notify_stage(job_id, JobStatus::PdfGeneration);
        persist::persist_rendered(self.jobs.as_ref(), job_id, &report_key).await?;
        self.notify_stage(job_id, JobStatus::Completed);
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        if let Some(ref cb) = progress {
            cb.on_pipeline_complete(job_id, &report_key);
        }

        let summary = RunSummary {
            job_id: job_id.to_string(),
            total_pages,
            chunks_processed: fanned.chunks_processed,
            sections_extracted,
            sections_dropped: fanned.dropped,
            section_failures: fanned.failures,
            sections_consolidated: report.len(),
            report_key: Some(report_key),
            chunking_duration_ms,
            extraction_duration_ms,
            consolidation_duration_ms,
            render_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Job {}: done in {}ms ({} chunks, {} sections)",
            job_id, summary.total_duration_ms, summary.chunks_processed, summary.sections_consolidated
        );
        Ok(summary)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn get_job(&self, job_id: &str) -> Result<Job, DocReportError> {
        store::require_job(self.jobs.as_ref(), job_id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, DocReportError> {
        self.jobs.list().await
    }

    /// The status envelope for `job_id`.
    pub async fn job_response(&self, job_id: &str) -> StageResponse {
        let job = self.get_job(job_id).await;
        respond(job_id, job.as_ref())
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    async fn advance(&self, job_id: &str, status: JobStatus) -> Result<Job, DocReportError> {
        let job = store::set_status(self.jobs.as_ref(), job_id, status).await?;
        self.notify_stage(job_id, status);
        Ok(job)
    }

    fn notify_stage(&self, job_id: &str, status: JobStatus) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(job_id, status);
        }
    }

    async fn mark_failed(&self, job_id: &str, err: &DocReportError) {
        error!("Job {}: {} [{}]", job_id, err, err.code());
        match store::set_status(self.jobs.as_ref(), job_id, JobStatus::Error).await {
            Ok(_) => self.notify_stage(job_id, JobStatus::Error),
            Err(DocReportError::JobNotFound { .. }) => {}
            Err(e) => warn!("Job {}: could not record ERROR status: {}", job_id, e),
        }
    }
}

// ── Response mapping ─────────────────────────────────────────────────────

/// What a caller at the pipeline boundary sees for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResponse {
    pub job_id: String,
    /// `None` when the job does not exist.
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Map a job lookup, or the error that replaced it, to a [`StageResponse`].
pub fn respond(job_id: &str, outcome: Result<&Job, &DocReportError>) -> StageResponse {
    match outcome {
        Ok(job) => StageResponse {
            job_id: job.id.clone(),
            status: Some(job.status),
            report_key: job.report_key.clone(),
            error_code: None,
            error: None,
        },
        Err(err) => StageResponse {
            job_id: job_id.to_string(),
            status: match err {
                DocReportError::JobNotFound { .. } => None,
                _ => Some(JobStatus::Error),
            },
            report_key: None,
            error_code: Some(err.code().to_string()),
            error: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_job_maps_to_status_and_key() {
        let mut job = Job::new("job-1", "deed.pdf", "uploads/deed.pdf");
        job.status = JobStatus::Completed;
        job.report_key = Some("u/document_report.pdf".into());
        let r = respond("job-1", Ok(&job));
        assert_eq!(r.status, Some(JobStatus::Completed));
        assert_eq!(r.report_key.as_deref(), Some("u/document_report.pdf"));
        assert!(r.error.is_none());

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "COMPLETED");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn errors_map_to_codes() {
        let missing = DocReportError::JobNotFound {
            job_id: "ghost".into(),
        };
        let r = respond("ghost", Err(&missing));
        assert_eq!(r.status, None);
        assert_eq!(r.error_code.as_deref(), Some("NOT_FOUND"));

        let mismatch = DocReportError::JobIdMismatch {
            expected: "a".into(),
            found: "b".into(),
        };
        let r = respond("a", Err(&mismatch));
        assert_eq!(r.status, Some(JobStatus::Error));
        assert_eq!(r.error_code.as_deref(), Some("CONSISTENCY"));
    }
}
