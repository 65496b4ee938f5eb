//! Input resolution: load the page-indexed text produced by the upstream
//! text-extraction job, and interpret its completion events.
//!
//! ## Accepted shapes
//!
//! The extracted document can be a local file or an HTTP(S) URL, containing
//! any of:
//!
//! * a JSON object `{ "job_id": "...", "document_name": "...", "pages": ["...", ...] }`
//! * a bare JSON array of page strings
//! * plain text with pages separated by form feeds (`\x0c`), as `pdftotext`
//!   writes them

use crate::error::DocReportError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Page-indexed plain text for one document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// The extraction job id, when the producer recorded it.
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    pub pages: Vec<String>,
}

impl ExtractedDocument {
    pub fn from_pages(pages: Vec<String>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }
}

/// Completion signal from the text-extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtractionEvent {
    pub job_id: String,
    pub status: String,
}

impl ExtractionEvent {
    pub fn succeeded(&self) -> bool {
        self.status == "SUCCEEDED"
    }

    /// Interpret a batch of queued event messages. The last message wins.
    pub fn last_of<S: AsRef<str>>(messages: &[S]) -> Result<Self, DocReportError> {
        let last = messages.last().ok_or_else(|| DocReportError::InvalidInput {
            input: "<event batch>".into(),
            reason: "no extraction event in batch".into(),
        })?;
        if messages.len() > 1 {
            debug!(
                "{} extraction events queued, using the last one",
                messages.len()
            );
        }
        serde_json::from_str(last.as_ref()).map_err(|e| DocReportError::InvalidInput {
            input: last.as_ref().chars().take(80).collect(),
            reason: format!("malformed extraction event: {e}"),
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load an extracted document from a local path or URL.
pub async fn load_document(
    input: &str,
    timeout_secs: u64,
) -> Result<ExtractedDocument, DocReportError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    let doc = parse_document(&bytes, input)?;
    if doc.pages.is_empty() {
        warn!("Extracted document '{}' has no pages", input);
    }
    Ok(doc)
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, DocReportError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DocReportError::FileNotFound { path })
        }
        Err(e) => Err(DocReportError::InvalidInput {
            input: path_str.to_string(),
            reason: e.to_string(),
        }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, DocReportError> {
    info!("Downloading extracted text from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocReportError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DocReportError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DocReportError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DocReportError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DocReportError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    Ok(bytes.to_vec())
}

/// Interpret raw bytes as one of the accepted document shapes.
pub fn parse_document(bytes: &[u8], source: &str) -> Result<ExtractedDocument, DocReportError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DocReportError::InvalidInput {
        input: source.to_string(),
        reason: format!("not UTF-8 text: {e}"),
    })?;
    let trimmed = text.trim_start();

    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed).map_err(|e| DocReportError::InvalidInput {
            input: source.to_string(),
            reason: format!("invalid document JSON: {e}"),
        });
    }
    if trimmed.starts_with('[') {
        let pages: Vec<String> =
            serde_json::from_str(trimmed).map_err(|e| DocReportError::InvalidInput {
                input: source.to_string(),
                reason: format!("invalid page array: {e}"),
            })?;
        return Ok(ExtractedDocument::from_pages(pages));
    }

    let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
    // pdftotext ends the last page with a form feed too
    if pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    Ok(ExtractedDocument::from_pages(pages))
}
