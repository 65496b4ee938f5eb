//! Durable storage seams: the job record store and the blob store.
//!
//! Every stage talks to storage through [`JobStore`] and [`BlobStore`]
//! handles injected by the orchestrator, never through globals, so tests run
//! the whole pipeline against [`InMemoryJobStore`] / [`InMemoryBlobStore`]
//! and the CLI runs it against the filesystem implementations.
//!
//! ## Status monotonicity
//!
//! [`JobStore::update`] is a read-modify-write keyed by job id. Both
//! implementations perform it under a lock and reject any status that
//! [`JobStatus::can_transition_to`] refuses, so a late chunk worker writing
//! `INFORMATION_EXTRACTION` cannot drag a consolidated job backwards.

use crate::error::DocReportError;
use crate::job::{Job, JobStatus, JobUpdate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Key-value store holding [`Job`] records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Write a job record, replacing any record with the same id.
    async fn put(&self, job: Job) -> Result<(), DocReportError>;

    async fn get(&self, job_id: &str) -> Result<Option<Job>, DocReportError>;

    /// Apply a partial update and return the stored result.
    ///
    /// Fails with [`DocReportError::JobNotFound`] for unknown ids and with
    /// [`DocReportError::InvalidStatusTransition`] for backward moves.
    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<Job, DocReportError>;

    async fn list(&self) -> Result<Vec<Job>, DocReportError>;
}

/// Opaque byte storage for rendered reports.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return a location string for it.
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, DocReportError>;

    async fn download(&self, key: &str) -> Result<Vec<u8>, DocReportError>;
}

/// Apply `update` to `job` in place, enforcing the status state machine.
pub fn apply_update(job: &mut Job, update: JobUpdate) -> Result<(), DocReportError> {
    if let Some(next) = update.status {
        if !job.status.can_transition_to(next) {
            return Err(DocReportError::InvalidStatusTransition {
                job_id: job.id.clone(),
                from: job.status,
                to: next,
            });
        }
        job.status = next;
    }
    if let Some(report) = update.json_report {
        job.json_report = Some(report);
    }
    if let Some(key) = update.report_key {
        job.report_key = Some(key);
    }
    Ok(())
}

/// Read a job or fail with [`DocReportError::JobNotFound`].
pub async fn require_job(store: &dyn JobStore, job_id: &str) -> Result<Job, DocReportError> {
    store
        .get(job_id)
        .await?
        .ok_or_else(|| DocReportError::JobNotFound {
            job_id: job_id.to_string(),
        })
}

/// Set a job's status, logging the transition.
pub async fn set_status(
    store: &dyn JobStore,
    job_id: &str,
    status: JobStatus,
) -> Result<Job, DocReportError> {
    debug!("Job {}: status -> {}", job_id, status);
    store.update(job_id, JobUpdate::status(status)).await
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Job store backed by a `HashMap`. Used by tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: Job) -> Result<(), DocReportError> {
        self.jobs.write().await.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, DocReportError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<Job, DocReportError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| DocReportError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        apply_update(job, update)?;
        Ok(job.clone())
    }

    async fn list(&self) -> Result<Vec<Job>, DocReportError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }
}

/// Blob store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, DocReportError> {
        validate_key(key)?;
        self.blobs.write().await.insert(key.to_string(), bytes);
        Ok(format!("memory://{key}"))
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, DocReportError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| DocReportError::Storage {
                key: key.to_string(),
                detail: "no such blob".into(),
            })
    }
}

// ── Filesystem ───────────────────────────────────────────────────────────

/// Job store keeping one JSON file per job under a directory.
///
/// Writes go to a temp file and are renamed into place, so a reader never
/// sees a half-written record.
#[derive(Debug)]
pub struct FileJobStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, job_id: &str) -> Result<PathBuf, DocReportError> {
        if job_id.is_empty()
            || job_id
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
            || job_id.starts_with('.')
        {
            return Err(DocReportError::InvalidInput {
                input: job_id.to_string(),
                reason: "job ids may only contain letters, digits, '-', '_' and '.'".into(),
            });
        }
        Ok(self.dir.join(format!("{job_id}.json")))
    }

    async fn read(&self, job_id: &str) -> Result<Option<Job>, DocReportError> {
        let path = self.path_for(job_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence(job_id, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| persistence(job_id, e))
    }

    async fn write(&self, job: &Job) -> Result<(), DocReportError> {
        let path = self.path_for(&job.id)?;
        let json = serde_json::to_vec_pretty(job).map_err(|e| persistence(&job.id, e))?;
        atomic_write(&path, &json)
            .await
            .map_err(|e| persistence(&job.id, e))
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn put(&self, job: Job) -> Result<(), DocReportError> {
        let _guard = self.write_lock.lock().await;
        self.write(&job).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, DocReportError> {
        self.read(job_id).await
    }

    async fn update(&self, job_id: &str, update: JobUpdate) -> Result<Job, DocReportError> {
        let _guard = self.write_lock.lock().await;
        let mut job = self
            .read(job_id)
            .await?
            .ok_or_else(|| DocReportError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        apply_update(&mut job, update)?;
        self.write(&job).await?;
        Ok(job)
    }

    async fn list(&self) -> Result<Vec<Job>, DocReportError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(persistence("*", e)),
        };
        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| persistence("*", e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| persistence("*", e))?;
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => jobs.push(job),
                Err(e) => debug!("Skipping unreadable job file {}: {}", path.display(), e),
            }
        }
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }
}

/// Blob store writing each key as a file under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, DocReportError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<String, DocReportError> {
        let path = self.path_for(key)?;
        atomic_write(&path, &bytes)
            .await
            .map_err(|e| DocReportError::Storage {
                key: key.to_string(),
                detail: e.to_string(),
            })?;
        Ok(path.display().to_string())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, DocReportError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| DocReportError::Storage {
                key: key.to_string(),
                detail: e.to_string(),
            })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Keys are relative, '/'-separated and may not climb out of the root.
fn validate_key(key: &str) -> Result<(), DocReportError> {
    let ok = !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(DocReportError::Storage {
            key: key.to_string(),
            detail: "blob keys must be relative paths without '..'".into(),
        })
    }
}

/// Write to `<path>.tmp` then rename over `path`.
async fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

fn persistence(job_id: &str, e: impl std::fmt::Display) -> DocReportError {
    DocReportError::Persistence {
        job_id: job_id.to_string(),
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(id: &str) -> Job {
        Job::new(id, "charter.pdf", "uploads/charter.pdf")
    }

    #[tokio::test]
    async fn memory_update_advances_status() {
        let store = InMemoryJobStore::new();
        store.put(job("j1")).await.unwrap();
        let updated = set_status(&store, "j1", JobStatus::PageChunking).await.unwrap();
        assert_eq!(updated.status, JobStatus::PageChunking);
    }

    #[tokio::test]
    async fn memory_update_refuses_backward_move() {
        let store = InMemoryJobStore::new();
        store.put(job("j1")).await.unwrap();
        set_status(&store, "j1", JobStatus::InformationConsolidation)
            .await
            .unwrap();
        let err = set_status(&store, "j1", JobStatus::InformationExtraction)
            .await
            .unwrap_err();
        assert!(matches!(err, DocReportError::InvalidStatusTransition { .. }));
        let stored = store.get("j1").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::InformationConsolidation);
    }

    #[tokio::test]
    async fn update_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store
            .update("ghost", JobUpdate::status(JobStatus::Error))
            .await
            .unwrap_err();
        assert!(matches!(err, DocReportError::JobNotFound { .. }));
        assert!(matches!(
            require_job(&store, "ghost").await,
            Err(DocReportError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn file_store_round_trips_and_lists() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::new(dir.path());
        store.put(job("b")).await.unwrap();
        store.put(job("a")).await.unwrap();
        store
            .update(
                "a",
                JobUpdate::status(JobStatus::ReportPersisted).with_json_report("{}"),
            )
            .await
            .unwrap();

        let a = store.get("a").await.unwrap().unwrap();
        assert_eq!(a.status, JobStatus::ReportPersisted);
        assert_eq!(a.json_report.as_deref(), Some("{}"));

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileJobStore::new(dir.path());
        assert!(store.get("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn fs_blob_store_writes_nested_keys() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let loc = blobs
            .upload("abc/document_report.pdf", b"%PDF-1.5".to_vec())
            .await
            .unwrap();
        assert!(loc.ends_with("document_report.pdf"));
        assert_eq!(
            blobs.download("abc/document_report.pdf").await.unwrap(),
            b"%PDF-1.5"
        );
        assert!(blobs.upload("../escape.pdf", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn memory_blob_download_missing_is_storage_error() {
        let blobs = InMemoryBlobStore::new();
        assert!(matches!(
            blobs.download("nope").await,
            Err(DocReportError::Storage { .. })
        ));
    }
}
