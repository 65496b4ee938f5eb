//! Configuration types for document analysis.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. Keeping every knob in one struct makes it
//! easy to share a config across concurrent chunk workers and to log exactly
//! what a run used.
//!
//! # Design choice: builder over constructor
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest. `build()` validates the combination and
//! resolves the prompt templates once, so no stage has to branch on language
//! or model family later.

use crate::error::DocReportError;
use crate::progress::ProgressCallback;
use crate::prompts::{Language, PromptSet};
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Smallest cell budget that still leaves room for list numbering.
const MIN_CELL_CHARS: usize = 40;

/// Configuration for a document-analysis run.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docreport::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .chunk_size(5)
///     .page_overlap(1)
///     .max_concurrency(5)
///     .confidence_threshold(85)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Pages per chunk. Default: 5. Zero disables chunking (by-page mode).
    ///
    /// Five pages of a charter fit comfortably in one extraction prompt while
    /// keeping the number of LLM calls per document low.
    pub chunk_size: usize,

    /// Pages repeated from the previous chunk at the start of each chunk. Default: 1.
    ///
    /// A shareholder table that starts at the bottom of page 5 is otherwise
    /// cut in half between two chunks.
    pub page_overlap: usize,

    /// Chunks extracted concurrently. Default: 5.
    pub max_concurrency: usize,

    /// Results with `confidence_level` at or below this are dropped. Range 0–100. Default: 85.
    pub confidence_threshold: u8,

    /// Include few-shot examples in extraction prompts. Default: false.
    pub use_examples: bool,

    /// Root of the few-shot examples tree: `<dir>/<language>/<section>/*.txt`.
    pub examples_dir: PathBuf,

    /// Document and prompt language. Default: English.
    pub language: Language,

    /// LLM model identifier for extraction, e.g. "gpt-4.1-mini".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// Model used for consolidation. Falls back to `model`.
    pub consolidation_model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per structured answer. Default: 1500.
    pub max_tokens: usize,

    /// Retry policy for every LLM call. Default: 10 attempts, 10 s doubling to 60 s.
    pub retry: RetryPolicy,

    /// Per-attempt timeout for extraction calls in seconds. Default: 900.
    pub extraction_timeout_secs: u64,

    /// Per-attempt timeout for consolidation calls in seconds. Default: 300.
    pub consolidation_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// How per-chunk candidates are merged. Default: [`ConsolidationStrategy::Llm`].
    pub consolidation_strategy: ConsolidationStrategy,

    /// Character budget for one rendered table cell. Default: 250.
    pub cell_max_chars: usize,

    /// File name of the rendered report inside its blob prefix. Default: "document_report.pdf".
    pub report_filename: String,

    /// Title printed on the first report page. Default depends on `language`.
    pub report_title: Option<String>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,

    prompts: &'static PromptSet,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            page_overlap: 1,
            max_concurrency: 5,
            confidence_threshold: 85,
            use_examples: false,
            examples_dir: PathBuf::from("prompt_examples"),
            language: Language::En,
            model: None,
            consolidation_model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1500,
            retry: RetryPolicy::default(),
            extraction_timeout_secs: 900,
            consolidation_timeout_secs: 300,
            download_timeout_secs: 120,
            consolidation_strategy: ConsolidationStrategy::default(),
            cell_max_chars: 250,
            report_filename: "document_report.pdf".to_string(),
            report_title: None,
            progress_callback: None,
            prompts: PromptSet::resolve(Language::En, ""),
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("chunk_size", &self.chunk_size)
            .field("page_overlap", &self.page_overlap)
            .field("max_concurrency", &self.max_concurrency)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("use_examples", &self.use_examples)
            .field("language", &self.language)
            .field("model", &self.model)
            .field("consolidation_model", &self.consolidation_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("retry_attempts", &self.retry.max_attempts)
            .field("consolidation_strategy", &self.consolidation_strategy)
            .field("cell_max_chars", &self.cell_max_chars)
            .field("report_filename", &self.report_filename)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Prompt templates resolved for this config's language and model.
    pub fn prompts(&self) -> &'static PromptSet {
        self.prompts
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn consolidation_timeout(&self) -> Duration {
        Duration::from_secs(self.consolidation_timeout_secs)
    }

    /// The title printed at the top of the report.
    pub fn report_title(&self) -> &str {
        match (&self.report_title, self.language) {
            (Some(title), _) => title,
            (None, Language::En) => "Document Summary",
            (None, Language::Es) => "Resumen de Documento",
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages;
        self
    }

    pub fn page_overlap(mut self, pages: usize) -> Self {
        self.config.page_overlap = pages;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n.max(1);
        self
    }

    pub fn confidence_threshold(mut self, threshold: u8) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn use_examples(mut self, v: bool) -> Self {
        self.config.use_examples = v;
        self
    }

    pub fn examples_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.examples_dir = dir.into();
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.config.language = language;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn consolidation_model(mut self, model: impl Into<String>) -> Self {
        self.config.consolidation_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs;
        self
    }

    pub fn consolidation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.consolidation_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn consolidation_strategy(mut self, strategy: ConsolidationStrategy) -> Self {
        self.config.consolidation_strategy = strategy;
        self
    }

    pub fn cell_max_chars(mut self, n: usize) -> Self {
        self.config.cell_max_chars = n;
        self
    }

    pub fn report_filename(mut self, name: impl Into<String>) -> Self {
        self.config.report_filename = name.into();
        self
    }

    pub fn report_title(mut self, title: impl Into<String>) -> Self {
        self.config.report_title = Some(title.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<AnalysisConfig, DocReportError> {
        let c = &self.config;
        if c.chunk_size > 0 && c.page_overlap >= c.chunk_size {
            warn!(
                "page_overlap ({}) is not smaller than chunk_size ({}); consecutive chunks repeat whole chunks",
                c.page_overlap, c.chunk_size
            );
        }
        if c.confidence_threshold > 100 {
            return Err(DocReportError::InvalidConfig(format!(
                "confidence_threshold must be 0–100, got {}",
                c.confidence_threshold
            )));
        }
        if c.max_concurrency == 0 {
            return Err(DocReportError::InvalidConfig(
                "max_concurrency must be ≥ 1".into(),
            ));
        }
        if c.cell_max_chars < MIN_CELL_CHARS {
            return Err(DocReportError::InvalidConfig(format!(
                "cell_max_chars must be ≥ {}, got {}",
                MIN_CELL_CHARS, c.cell_max_chars
            )));
        }
        if c.report_filename.is_empty() || c.report_filename.contains('/') {
            return Err(DocReportError::InvalidConfig(format!(
                "report_filename must be a bare file name, got '{}'",
                c.report_filename
            )));
        }

        let prompts = PromptSet::resolve(c.language, c.model.as_deref().unwrap_or_default());
        self.config.prompts = prompts;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the candidates for one section are merged into a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationStrategy {
    /// Ask the consolidation model, then ground its answer in the candidates. (default)
    #[default]
    Llm,
    /// Deterministic per-field majority vote; no model call.
    Vote,
}

impl FromStr for ConsolidationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(ConsolidationStrategy::Llm),
            "vote" => Ok(ConsolidationStrategy::Vote),
            other => Err(format!("unknown consolidation strategy '{other}'")),
        }
    }
}
