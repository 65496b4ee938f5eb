//! Report persistence: two writes to the job record, one per milestone.
//!
//! | Call | Writes | Status afterwards |
//! |------|--------|-------------------|
//! | [`persist`] | `json_report` | `REPORT_PERSISTED` |
//! | [`persist_rendered`] | `report_key` | `COMPLETED` |
//!
//! Any store failure is returned as-is; there is no partial success to fall
//! back on.

use crate::error::DocReportError;
use crate::job::{Job, JobStatus, JobUpdate};
use crate::output::Report;
use crate::store::JobStore;
use tracing::info;

/// Store the serialised report on the job and mark it `REPORT_PERSISTED`.
pub async fn persist(store: &dyn JobStore, job_id: &str, report: &Report) -> Result<Job, DocReportError> {
    let json = report.to_json_string()?;
    let job = store
        .update(
            job_id,
            JobUpdate::status(JobStatus::ReportPersisted).with_json_report(json),
        )
        .await?;
    info!("Job {}: report with {} sections persisted", job_id, report.len());
    Ok(job)
}

/// Record where the rendered report lives and mark the job `COMPLETED`.
pub async fn persist_rendered(store: &dyn JobStore, job_id: &str, report_key: &str) -> Result<Job, DocReportError> {
    let job = store
        .update(
            job_id,
            JobUpdate::status(JobStatus::Completed).with_report_key(report_key),
        )
        .await?;
    info!("Job {}: completed, report at {}", job_id, report_key);
    Ok(job)
}
