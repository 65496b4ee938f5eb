//! Structured-output LLM seam.
//!
//! Extraction and consolidation both need the same thing from a model: send
//! a system and a user message, get one JSON object back. [`StructuredLlm`]
//! is that contract. [`ProviderLlm`] implements it over any `edgequake-llm`
//! provider; tests implement it with scripted fakes.
//!
//! This module does not retry. Retrying is the call site's decision, made by
//! the [`crate::retry::RetryPolicy`] it was handed; this layer only reports
//! *what kind* of failure happened via [`LlmCallError`].

use crate::config::AnalysisConfig;
use crate::error::{DocReportError, LlmCallError};
use crate::pipeline::postprocess;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// One structured request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredRequest {
    /// Short description for logs, e.g. `"chunk 2 / shareholders"`.
    pub label: String,
    pub system: String,
    pub user: String,
}

/// A model that answers with a single JSON object.
#[async_trait]
pub trait StructuredLlm: Send + Sync {
    async fn complete_json(&self, request: &StructuredRequest) -> Result<Value, LlmCallError>;
}

/// [`StructuredLlm`] over an `edgequake-llm` provider.
pub struct ProviderLlm {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderLlm {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Build `CompletionOptions` for one structured call.
fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl StructuredLlm for ProviderLlm {
    async fn complete_json(&self, request: &StructuredRequest) -> Result<Value, LlmCallError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.user.as_str()),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&build_options(self.temperature, self.max_tokens)))
            .await
            .map_err(|e| LlmCallError::classify(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        postprocess::extract_answer(&response.content).map_err(LlmCallError::InvalidOutput)
    }
}

/// Build the extraction and consolidation clients for a config.
///
/// Consolidation uses `consolidation_model` when set and the provider can be
/// re-created by name; otherwise both stages share one client.
pub fn build_clients(
    config: &AnalysisConfig,
) -> Result<(Arc<dyn StructuredLlm>, Arc<dyn StructuredLlm>), DocReportError> {
    let extraction_provider = resolve_provider(config, config.model.as_deref())?;
    let extraction: Arc<dyn StructuredLlm> =
        Arc::new(ProviderLlm::new(extraction_provider, config));

    let consolidation: Arc<dyn StructuredLlm> = match (&config.consolidation_model, &config.provider) {
        (Some(model), None) => {
            let provider = resolve_provider(config, Some(model))?;
            Arc::new(ProviderLlm::new(provider, config))
        }
        _ => Arc::clone(&extraction),
    };
    Ok((extraction, consolidation))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocReportError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocReportError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `model` or
///    [`DEFAULT_MODEL`].
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, both
///    non-empty. An explicit `model` still overrides `EDGEQUAKE_MODEL`.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(
    config: &AnalysisConfig,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, DocReportError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, model.unwrap_or(&env_model));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model.unwrap_or(DEFAULT_MODEL));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocReportError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = AnalysisConfig::default();
        let opts = build_options(config.temperature, config.max_tokens);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(1500));
    }
}
