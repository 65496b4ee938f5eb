//! Report rendering: lay the persisted report out as table pages and encode
//! them as a PDF.
//!
//! ## Layout
//!
//! One page per section present in the report, in report order. The report
//! title sits on top of the first page. Each section turns itself into rows
//! of labelled cells ([`SectionValue::to_table_rows`]); the layout only wraps
//! cell text to its column and moves rows that do not fit onto a
//! continuation page for the same section.
//!
//! ## Why spawn_blocking?
//!
//! Building and compressing the PDF is CPU-bound and synchronous. Running it
//! on the blocking pool keeps the Tokio workers free while a long report is
//! encoded.
//!
//! Text uses the standard Helvetica fonts with `WinAnsiEncoding`, so no font
//! file is embedded. Characters outside that encoding print as `?`.

use crate::config::AnalysisConfig;
use crate::error::DocReportError;
use crate::job::JobStatus;
use crate::output::Report;
use crate::sections::{SectionKind, SectionValue};
use crate::store::{self, BlobStore, JobStore};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

// A4 portrait, in points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 42.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const TITLE_SIZE: f32 = 16.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 9.0;
const LEADING: f32 = 11.0;
const CELL_PADDING: f32 = 4.0;

/// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.5;

// ── Layout ───────────────────────────────────────────────────────────────

/// One drawing instruction on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum Draw {
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    /// A horizontal rule across the content width.
    Rule { y: f32 },
}

/// A laid-out page.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPage {
    /// Section shown on this page; `None` only for the placeholder page of
    /// an empty report.
    pub section: Option<SectionKind>,
    /// `true` when the page continues the previous page's section.
    pub continued: bool,
    pub draws: Vec<Draw>,
}

impl LayoutPage {
    /// Lines of text on the page, top to bottom.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.draws.iter().filter_map(|d| match d {
            Draw::Text { text, .. } => Some(text.as_str()),
            Draw::Rule { .. } => None,
        })
    }
}

/// Lay `report` out as pages.
pub fn layout_report(report: &Report, title: &str, cell_max_chars: usize) -> Vec<LayoutPage> {
    let mut pages = Vec::new();

    if report.is_empty() {
        let mut page = LayoutPage {
            section: None,
            continued: false,
            draws: Vec::new(),
        };
        let y = PAGE_HEIGHT - MARGIN;
        page.draws.push(text(MARGIN, y - TITLE_SIZE, TITLE_SIZE, true, title));
        page.draws.push(text(
            MARGIN,
            y - TITLE_SIZE - 2.0 * LEADING,
            BODY_SIZE,
            false,
            "No information could be extracted from this document.",
        ));
        pages.push(page);
        return pages;
    }

    for (index, (kind, value)) in report.iter().enumerate() {
        let page_title = if index == 0 { Some(title) } else { None };
        layout_section(&mut pages, kind, value, page_title, cell_max_chars);
    }
    pages
}

fn layout_section(
    pages: &mut Vec<LayoutPage>,
    kind: SectionKind,
    value: &SectionValue,
    report_title: Option<&str>,
    cell_max_chars: usize,
) {
    let rows = value.to_table_rows(cell_max_chars);
    let columns = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let column_width = CONTENT_WIDTH / columns as f32;
    let chars_per_line = (((column_width - 2.0 * CELL_PADDING) / (BODY_SIZE * GLYPH_WIDTH)) as usize).max(4);

    let (mut page, mut y) = start_page(kind, false, report_title);
    let page_capacity = ((y - MARGIN - CELL_PADDING) / LEADING) as usize;

    for row in rows {
        let cells: Vec<Vec<String>> = row
            .iter()
            .map(|cell| {
                let mut lines = wrap(cell, chars_per_line);
                if lines.len() > page_capacity {
                    lines.truncate(page_capacity.saturating_sub(1));
                    lines.push("...".to_string());
                }
                lines
            })
            .collect();
        let line_count = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let height = line_count as f32 * LEADING + CELL_PADDING;

        if y - height < MARGIN {
            pages.push(page);
            (page, y) = start_page(kind, true, None);
        }

        for (column, lines) in cells.iter().enumerate() {
            let x = MARGIN + column as f32 * column_width + CELL_PADDING;
            for (line_no, line) in lines.iter().enumerate() {
                let baseline = y - LEADING * (line_no as f32 + 1.0);
                page.draws.push(text(x, baseline, BODY_SIZE, false, line));
            }
        }
        y -= height;
        page.draws.push(Draw::Rule { y: y + CELL_PADDING / 2.0 });
    }
    pages.push(page);
}

/// A fresh page with its headings; returns the page and the first free y.
fn start_page(kind: SectionKind, continued: bool, report_title: Option<&str>) -> (LayoutPage, f32) {
    let mut page = LayoutPage {
        section: Some(kind),
        continued,
        draws: Vec::new(),
    };
    let mut y = PAGE_HEIGHT - MARGIN;

    if let Some(title) = report_title {
        y -= TITLE_SIZE;
        page.draws.push(text(MARGIN, y, TITLE_SIZE, true, title));
        y -= LEADING;
    }

    y -= HEADING_SIZE;
    let heading = if continued {
        format!("{} (cont.)", kind.title())
    } else {
        kind.title().to_string()
    };
    page.draws.push(text(MARGIN, y, HEADING_SIZE, true, &heading));
    y -= LEADING / 2.0;
    page.draws.push(Draw::Rule { y });
    (page, y)
}

fn text(x: f32, y: f32, size: f32, bold: bool, text: &str) -> Draw {
    Draw::Text {
        x,
        y,
        size,
        bold,
        text: text.to_string(),
    }
}

/// Greedy word wrap. Embedded newlines are kept; words longer than a line
/// are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                lines.push(word.drain(..width).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }
            if line.is_empty() {
                line = word;
            } else if line.chars().count() + 1 + word.chars().count() <= width {
                line.push(' ');
                line.push_str(&word);
            } else {
                lines.push(std::mem::replace(&mut line, word));
            }
        }
        lines.push(line);
    }
    while lines.len() > 1 && lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

// ── PDF encoding ─────────────────────────────────────────────────────────

/// Encode laid-out pages as a PDF document.
pub fn encode_pdf(pages: &[LayoutPage]) -> Result<Vec<u8>, DocReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content = Content {
            operations: page_operations(page),
        };
        let bytes = content
            .encode()
            .map_err(|e| DocReportError::Render(format!("content stream: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| DocReportError::Render(format!("write: {e}")))?;
    Ok(out)
}

fn page_operations(page: &LayoutPage) -> Vec<Operation> {
    let mut ops = Vec::new();
    for draw in &page.draws {
        match draw {
            Draw::Text {
                x,
                y,
                size,
                bold,
                text,
            } => {
                let font = if *bold { "F2" } else { "F1" };
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("Tf", vec![font.into(), Object::Real(*size)]));
                ops.push(Operation::new("Td", vec![Object::Real(*x), Object::Real(*y)]));
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(text), StringFormat::Literal)],
                ));
                ops.push(Operation::new("ET", vec![]));
            }
            Draw::Rule { y } => {
                ops.push(Operation::new("w", vec![Object::Real(0.5)]));
                ops.push(Operation::new("m", vec![Object::Real(MARGIN), Object::Real(*y)]));
                ops.push(Operation::new(
                    "l",
                    vec![Object::Real(PAGE_WIDTH - MARGIN), Object::Real(*y)],
                ));
                ops.push(Operation::new("S", vec![]));
            }
        }
    }
    ops
}

/// Map text to single-byte `WinAnsiEncoding`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => b'-',
            '\u{2018}' | '\u{2019}' => b'\'',
            '\u{201C}' | '\u{201D}' => b'"',
            '\u{2026}' => b'.',
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

// ── Renderer ─────────────────────────────────────────────────────────────

/// Renders a job's persisted report and uploads the PDF.
pub struct ReportRenderer {
    blobs: Arc<dyn BlobStore>,
    title: String,
    cell_max_chars: usize,
    filename: String,
}

impl ReportRenderer {
    pub fn new(blobs: Arc<dyn BlobStore>, config: &AnalysisConfig) -> Self {
        Self {
            blobs,
            title: config.report_title().to_string(),
            cell_max_chars: config.cell_max_chars,
            filename: config.report_filename.clone(),
        }
    }

    /// Render the report persisted on `job_id` and return its blob key,
    /// `"{uuid}/{filename}"`.
    ///
    /// The job is marked `PDF_GENERATION` once its report has been found.
    /// Recording the key is left to the caller.
    pub async fn render(&self, jobs: &dyn JobStore, job_id: &str) -> Result<String, DocReportError> {
        let job = store::require_job(jobs, job_id).await?;
        let json = job.json_report.ok_or_else(|| DocReportError::ReportMissing {
            job_id: job_id.to_string(),
        })?;
        store::set_status(jobs, job_id, JobStatus::PdfGeneration).await?;

        let report = Report::from_json_str(&json)?;
        let pages = layout_report(&report, &self.title, self.cell_max_chars);
        debug!(
            "Job {}: {} sections laid out on {} pages",
            job_id,
            report.len(),
            pages.len()
        );

        let bytes = tokio::task::spawn_blocking(move || encode_pdf(&pages))
            .await
            .map_err(|e| DocReportError::Internal(format!("Render task panicked: {}", e)))??;

        let key = format!("{}/{}", Uuid::new_v4(), self.filename);
        let size = bytes.len();
        let location = self.blobs.upload(&key, bytes).await?;
        info!("Job {}: report uploaded to {} ({} bytes)", job_id, location, size);
        Ok(key)
    }
}
