//! End-to-end pipeline tests against scripted models and in-memory stores.
//!
//! No network access and no API keys: every model answer comes from a
//! routing closure keyed on the request label.

use async_trait::async_trait;
use edgequake_docreport::pipeline::render::layout_report;
use edgequake_docreport::{
    AnalysisConfig, BlobStore, ConsolidationStrategy, DocReportError, FileJobStore, FsBlobStore,
    InMemoryBlobStore, InMemoryJobStore, JobStatus, JobStore, LlmCallError, PipelineOrchestrator,
    PipelineProgressCallback, Report, RetryPolicy, SectionKind, SectionValue, StructuredLlm,
    StructuredRequest,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────

type Route = Box<dyn Fn(&StructuredRequest, usize) -> Result<Value, LlmCallError> + Send + Sync>;

/// Answers through `route(request, attempt)`, where `attempt` counts prior
/// calls carrying the same label.
struct RoutedLlm {
    route: Route,
    calls: Mutex<Vec<StructuredRequest>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl RoutedLlm {
    fn new(
        route: impl Fn(&StructuredRequest, usize) -> Result<Value, LlmCallError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            route: Box::new(route),
            calls: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
        })
    }

    fn calls(&self) -> Vec<StructuredRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StructuredLlm for RoutedLlm {
    async fn complete_json(&self, request: &StructuredRequest) -> Result<Value, LlmCallError> {
        self.calls.lock().unwrap().push(request.clone());
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(request.label.clone()).or_insert(0);
            *n += 1;
            *n
        };
        (self.route)(request, attempt)
    }
}

/// Parse `"chunk 3 / shareholders"` into `(3, Shareholders)`.
fn extraction_target(label: &str) -> Option<(usize, SectionKind)> {
    let rest = label.strip_prefix("chunk ")?;
    let (index, section) = rest.split_once(" / ")?;
    Some((index.parse().ok()?, SectionKind::from_str(section).ok()?))
}

fn answer(confidence: i64, info: Value) -> Result<Value, LlmCallError> {
    Ok(json!({
        "thinking": "scripted",
        "confidence_level": confidence,
        "conclusion": confidence > 50,
        "extracted_information": info
    }))
}

fn nothing_found() -> Result<Value, LlmCallError> {
    answer(0, json!({}))
}

/// A consolidation model that must never be reached.
fn unused_model() -> Arc<RoutedLlm> {
    RoutedLlm::new(|req, _| panic!("unexpected model call: {}", req.label))
}

#[derive(Default)]
struct StageRecorder {
    stages: Mutex<Vec<JobStatus>>,
}

impl PipelineProgressCallback for StageRecorder {
    fn on_stage(&self, _job_id: &str, status: JobStatus) {
        self.stages.lock().unwrap().push(status);
    }
}

fn pages(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("<p{i}> clause text\n")).collect()
}

fn config(chunk_size: usize, page_overlap: usize) -> edgequake_docreport::AnalysisConfigBuilder {
    AnalysisConfig::builder()
        .chunk_size(chunk_size)
        .page_overlap(page_overlap)
        .max_concurrency(2)
        .retry(RetryPolicy::immediate(10))
}

struct Harness {
    orchestrator: PipelineOrchestrator,
    jobs: Arc<InMemoryJobStore>,
    blobs: Arc<InMemoryBlobStore>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn harness(config: AnalysisConfig, extraction: Arc<RoutedLlm>, consolidation: Arc<RoutedLlm>) -> Harness {
    init_tracing();
    let jobs = Arc::new(InMemoryJobStore::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let orchestrator = PipelineOrchestrator::new(config, extraction, consolidation, jobs.clone(), blobs.clone());
    orchestrator
        .start_job("job-1", "charter.pdf", "uploads/charter.pdf")
        .await
        .unwrap();
    Harness {
        orchestrator,
        jobs,
        blobs,
    }
}

fn persisted_report(job: &edgequake_docreport::Job) -> Report {
    Report::from_json_str(job.json_report.as_deref().expect("report persisted")).unwrap()
}

// ── Scenario A: chunking ─────────────────────────────────────────────────

#[tokio::test]
async fn twelve_pages_become_three_overlapping_chunks() {
    let extraction = RoutedLlm::new(|_, _| nothing_found());
    let h = harness(config(5, 1).build().unwrap(), Arc::clone(&extraction), unused_model()).await;

    let summary = h.orchestrator.run("job-1", &pages(12)).await.unwrap();
    assert_eq!(summary.total_pages, 12);
    assert_eq!(summary.chunks_processed, 3);
    assert_eq!(summary.sections_extracted, 0);
    assert_eq!(summary.sections_dropped, 15);

    let calls = extraction.calls();
    assert_eq!(calls.len(), 15);
    let text_of = |index: usize| {
        calls
            .iter()
            .find(|c| extraction_target(&c.label) == Some((index, SectionKind::GeneralInformation)))
            .map(|c| c.user.clone())
            .unwrap()
    };

    let first = text_of(0);
    assert!(first.contains("<p0>") && first.contains("<p4>") && !first.contains("<p5>"));
    let second = text_of(1);
    assert!(second.contains("<p4>") && second.contains("<p9>"));
    assert!(!second.contains("<p3>") && !second.contains("<p10>"));
    let third = text_of(2);
    assert!(third.contains("<p9>") && third.contains("<p11>") && !third.contains("<p8>"));
}

// ── Scenario B: confidence filter ────────────────────────────────────────

#[tokio::test]
async fn low_confidence_extraction_never_reaches_consolidation() {
    let extraction = RoutedLlm::new(|req, _| match extraction_target(&req.label) {
        Some((0, SectionKind::GeneralInformation)) => answer(95, json!({"name": "ACME S.A."})),
        Some((1, SectionKind::GeneralInformation)) => answer(40, json!({"name": "Fake Corp"})),
        _ => nothing_found(),
    });
    let consolidation = RoutedLlm::new(|_, _| Ok(json!({"name": "ACME S.A."})));
    let h = harness(
        config(1, 0).build().unwrap(),
        extraction,
        Arc::clone(&consolidation),
    )
    .await;

    let summary = h.orchestrator.run("job-1", &pages(2)).await.unwrap();
    assert_eq!(summary.sections_extracted, 1);
    assert_eq!(summary.sections_dropped, 9);
    assert_eq!(summary.sections_consolidated, 1);

    let calls = consolidation.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].label, "consolidate / general_information");
    assert!(calls[0].user.contains("ACME S.A."));
    assert!(!calls[0].user.contains("Fake Corp"));

    let report = persisted_report(&h.jobs.get("job-1").await.unwrap().unwrap());
    match report.get(SectionKind::GeneralInformation) {
        Some(SectionValue::GeneralInformation(info)) => assert_eq!(info.name, "ACME S.A."),
        other => panic!("unexpected {other:?}"),
    }
}

// ── Scenario C: repetition wins ──────────────────────────────────────────

fn legal_representative_extraction() -> Arc<RoutedLlm> {
    RoutedLlm::new(|req, _| match extraction_target(&req.label) {
        Some((i, SectionKind::LegalRepresentative)) => {
            let name = if i == 2 { "Bob" } else { "Alice" };
            answer(92, json!({"name": name, "position": "Director"}))
        }
        _ => nothing_found(),
    })
}

#[tokio::test]
async fn vote_prefers_the_repeated_name() {
    let config = config(1, 0)
        .consolidation_strategy(ConsolidationStrategy::Vote)
        .build()
        .unwrap();
    let h = harness(config, legal_representative_extraction(), unused_model()).await;

    h.orchestrator.run("job-1", &pages(3)).await.unwrap();
    let report = persisted_report(&h.jobs.get("job-1").await.unwrap().unwrap());
    match report.get(SectionKind::LegalRepresentative) {
        Some(SectionValue::LegalRepresentative(rep)) => {
            assert_eq!(rep.name, "Alice");
            assert_eq!(rep.position, "Director");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn model_cannot_introduce_a_name_no_chunk_reported() {
    let consolidation = RoutedLlm::new(|_, _| Ok(json!({"name": "Carol", "position": "Director"})));
    let h = harness(
        config(1, 0).build().unwrap(),
        legal_representative_extraction(),
        consolidation,
    )
    .await;

    h.orchestrator.run("job-1", &pages(3)).await.unwrap();
    let report = persisted_report(&h.jobs.get("job-1").await.unwrap().unwrap());
    match report.get(SectionKind::LegalRepresentative) {
        Some(SectionValue::LegalRepresentative(rep)) => {
            assert_eq!(rep.name, "");
            assert_eq!(rep.position, "Director");
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ── Scenario D: consolidation retries ────────────────────────────────────

fn notary_extraction() -> Arc<RoutedLlm> {
    RoutedLlm::new(|req, _| match extraction_target(&req.label) {
        Some((_, SectionKind::NotaryInformation)) => {
            answer(90, json!({"notary_name": "Lic. Ramos", "document_number": "4512"}))
        }
        _ => nothing_found(),
    })
}

#[tokio::test]
async fn throttled_consolidation_succeeds_on_fourth_attempt() {
    let consolidation = RoutedLlm::new(|_, attempt| {
        if attempt <= 3 {
            Err(LlmCallError::Throttled("ThrottlingException".into()))
        } else {
            Ok(json!({"notary_name": "Lic. Ramos", "document_number": "4512"}))
        }
    });
    let h = harness(
        config(2, 0).build().unwrap(),
        notary_extraction(),
        Arc::clone(&consolidation),
    )
    .await;

    let summary = h.orchestrator.run("job-1", &pages(4)).await.unwrap();
    assert_eq!(consolidation.calls().len(), 4);
    assert!(summary.report_key.is_some());

    let report = persisted_report(&h.jobs.get("job-1").await.unwrap().unwrap());
    match report.get(SectionKind::NotaryInformation) {
        Some(SectionValue::NotaryInformation(n)) => {
            assert_eq!(n.notary_name, "Lic. Ramos");
            assert_eq!(n.document_number, "4512");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn endless_throttling_fails_the_job_after_ten_attempts() {
    let consolidation = RoutedLlm::new(|_, _| Err(LlmCallError::Throttled("429".into())));
    let h = harness(
        config(2, 0).build().unwrap(),
        notary_extraction(),
        Arc::clone(&consolidation),
    )
    .await;

    let err = h.orchestrator.run("job-1", &pages(4)).await.unwrap_err();
    match err {
        DocReportError::ConsolidationFailed { section, attempts, .. } => {
            assert_eq!(section, SectionKind::NotaryInformation);
            assert_eq!(attempts, 10);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(consolidation.calls().len(), 10);

    let job = h.jobs.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.json_report.is_none());
    assert!(h.blobs.keys().await.is_empty());
}

// ── Scenario E: rendering skips absent sections ──────────────────────────

#[tokio::test]
async fn rendered_report_has_one_page_per_present_section() {
    let extraction = RoutedLlm::new(|req, _| match extraction_target(&req.label) {
        Some((_, SectionKind::GeneralInformation)) => answer(96, json!({"name": "ACME S.A."})),
        Some((_, SectionKind::Shareholders)) => answer(
            96,
            json!({"shareholders": [{"shareholder_name": "Alice", "stock_units": "500", "stocks_value": "$500"}]}),
        ),
        Some((_, SectionKind::Administration)) => answer(
            96,
            json!({"managers": [{"name": "Bob", "position": "Manager", "powers": ["sign"]}]}),
        ),
        Some((_, SectionKind::LegalRepresentative)) => {
            answer(96, json!({"name": "Bob", "position": "Manager"}))
        }
        _ => nothing_found(),
    });
    let config = config(5, 1)
        .consolidation_strategy(ConsolidationStrategy::Vote)
        .report_title("Charter report")
        .build()
        .unwrap();
    let h = harness(config, extraction, unused_model()).await;

    let summary = h.orchestrator.run("job-1", &pages(6)).await.unwrap();
    assert_eq!(summary.sections_consolidated, 4);

    let job = h.jobs.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let key = job.report_key.clone().unwrap();
    assert_eq!(Some(key.clone()), summary.report_key);
    assert!(key.ends_with("/document_report.pdf"));

    let report = persisted_report(&job);
    assert!(report.get(SectionKind::NotaryInformation).is_none());
    let layout = layout_report(&report, "Charter report", 250);
    let sections: Vec<_> = layout.iter().filter_map(|p| p.section).collect();
    assert_eq!(
        sections,
        vec![
            SectionKind::GeneralInformation,
            SectionKind::Shareholders,
            SectionKind::Administration,
            SectionKind::LegalRepresentative,
        ]
    );

    let bytes = h.blobs.download(&key).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    let pdf = lopdf::Document::load_mem(&bytes).unwrap();
    assert_eq!(pdf.get_pages().len(), 4);
}

// ── Status handling ──────────────────────────────────────────────────────

#[tokio::test]
async fn status_only_moves_forward_through_every_milestone() {
    let recorder = Arc::new(StageRecorder::default());
    let config = config(5, 1)
        .consolidation_strategy(ConsolidationStrategy::Vote)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let h = harness(config, notary_extraction(), unused_model()).await;

    h.orchestrator.run("job-1", &pages(9)).await.unwrap();

    let stages = recorder.stages.lock().unwrap().clone();
    assert_eq!(
        stages,
        vec![
            JobStatus::TextExtraction,
            JobStatus::PageChunking,
            JobStatus::InformationConsolidation,
            JobStatus::ReportPersisted,
            JobStatus::PdfGeneration,
            JobStatus::Completed,
        ]
    );
    assert!(stages.windows(2).all(|w| w[0].can_transition_to(w[1])));

    let response = h.orchestrator.job_response("job-1").await;
    assert_eq!(response.status, Some(JobStatus::Completed));
    assert!(response.report_key.is_some());
    assert!(response.error_code.is_none());
}

#[tokio::test]
async fn failed_text_extraction_marks_the_job_failed() {
    let h = harness(config(5, 1).build().unwrap(), unused_model(), unused_model()).await;

    let err = h
        .orchestrator
        .on_extraction_event(&[
            r#"{"JobId": "job-1", "Status": "SUCCEEDED"}"#,
            r#"{"JobId": "job-1", "Status": "FAILED"}"#,
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, DocReportError::TextExtractionFailed { .. }));
    assert_eq!(err.code(), "TEXT_EXTRACTION");

    let response = h.orchestrator.job_response("job-1").await;
    assert_eq!(response.status, Some(JobStatus::Error));
}

#[tokio::test]
async fn successful_event_leaves_the_job_untouched() {
    let h = harness(config(5, 1).build().unwrap(), unused_model(), unused_model()).await;
    let event = h
        .orchestrator
        .on_extraction_event(&[r#"{"JobId": "job-1", "Status": "SUCCEEDED"}"#])
        .await
        .unwrap();
    assert_eq!(event.job_id, "job-1");
    let job = h.orchestrator.get_job("job-1").await.unwrap();
    assert_eq!(job.status, JobStatus::TextExtraction);
}

#[tokio::test]
async fn provider_failure_during_extraction_marks_the_job_failed() {
    let extraction = RoutedLlm::new(|_, _| Err(LlmCallError::Provider("invalid api key".into())));
    let h = harness(config(5, 1).build().unwrap(), extraction, unused_model()).await;

    let err = h.orchestrator.run("job-1", &pages(3)).await.unwrap_err();
    assert!(matches!(err, DocReportError::ExtractionFailed { .. }));
    let job = h.jobs.get("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Error);

    // a failed job stays failed
    let again = h.orchestrator.run("job-1", &pages(3)).await.unwrap_err();
    assert!(matches!(again, DocReportError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn unknown_job_is_reported_as_not_found() {
    let h = harness(config(5, 1).build().unwrap(), unused_model(), unused_model()).await;

    let err = h.orchestrator.run("ghost", &pages(2)).await.unwrap_err();
    assert!(matches!(err, DocReportError::JobNotFound { .. }));
    let response = h.orchestrator.job_response("ghost").await;
    assert_eq!(response.status, None);
    assert_eq!(response.error_code.as_deref(), Some("NOT_FOUND"));
    assert!(h.jobs.get("ghost").await.unwrap().is_none());
}

// ── Filesystem run ───────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_reads_page_text_and_writes_report_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("charter.json");
    let doc = json!({
        "job_id": "job-file",
        "document_name": "charter.pdf",
        "pages": pages(4),
    });
    std::fs::write(&input, doc.to_string()).unwrap();

    let jobs = Arc::new(FileJobStore::new(dir.path().join("jobs")));
    let blobs = Arc::new(FsBlobStore::new(dir.path().join("reports")));
    let config = config(2, 0)
        .consolidation_strategy(ConsolidationStrategy::Vote)
        .build()
        .unwrap();
    let orchestrator = PipelineOrchestrator::new(
        config,
        notary_extraction(),
        unused_model(),
        jobs.clone(),
        blobs.clone(),
    );

    let summary = orchestrator
        .analyze(input.to_str().unwrap(), None, None)
        .await
        .unwrap();
    assert_eq!(summary.job_id, "job-file");
    assert_eq!(summary.total_pages, 4);
    assert_eq!(summary.chunks_processed, 2);

    let job = orchestrator.get_job("job-file").await.unwrap();
    assert_eq!(job.document_name, "charter.pdf");
    assert_eq!(job.status, JobStatus::Completed);

    let path = blobs.path_for(job.report_key.as_deref().unwrap()).unwrap();
    assert!(path.exists());
    assert!(dir.path().join("jobs").join("job-file.json").exists());

    let listed = orchestrator.list_jobs().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn injected_examples_reach_only_their_section_prompt() {
    use edgequake_docreport::pipeline::extract::ExampleLibrary;

    let mut library = ExampleLibrary::empty();
    library.insert(
        SectionKind::Shareholders,
        vec!["EXAMPLE: Alice holds 500 shares".to_string()],
    );
    let extraction = RoutedLlm::new(|_, _| nothing_found());
    let jobs = Arc::new(InMemoryJobStore::new());
    let orchestrator = PipelineOrchestrator::new(
        config(5, 1).use_examples(true).build().unwrap(),
        Arc::clone(&extraction) as Arc<dyn StructuredLlm>,
        unused_model(),
        jobs,
        Arc::new(InMemoryBlobStore::new()),
    )
    .with_examples(library);
    orchestrator.start_job("job-1", "charter.pdf", "k").await.unwrap();

    orchestrator.run("job-1", &pages(2)).await.unwrap();
    for call in extraction.calls() {
        let with_example = call.user.contains("EXAMPLE: Alice holds 500 shares")
            || call.system.contains("EXAMPLE: Alice holds 500 shares");
        let is_shareholders = extraction_target(&call.label).map(|(_, s)| s) == Some(SectionKind::Shareholders);
        assert_eq!(with_example, is_shareholders, "{}", call.label);
    }
}

#[test]
fn malformed_event_batch_is_invalid_input() {
    let jobs = Arc::new(InMemoryJobStore::new());
    let orchestrator = PipelineOrchestrator::new(
        config(5, 1).build().unwrap(),
        unused_model(),
        unused_model(),
        jobs,
        Arc::new(InMemoryBlobStore::new()),
    );

    let empty: [&str; 0] = [];
    let err = tokio_test::block_on(orchestrator.on_extraction_event(&empty)).unwrap_err();
    assert_eq!(err.code(), "INPUT");
    let err = tokio_test::block_on(orchestrator.on_extraction_event(&["not json"])).unwrap_err();
    assert!(matches!(err, DocReportError::InvalidInput { .. }));
}
