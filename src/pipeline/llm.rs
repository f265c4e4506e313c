//! Transcription behind the [`Transcriber`] seam.
//!
//! [`VisionTranscriber`] turns a window of encoded page images into one VLM
//! request and returns the raw Markdown. Fence stripping and assembly happen
//! in the chunk processor, not here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) spaces retries out: with 500 ms base and
//! 3 retries the wait sequence is 500 ms → 1 s → 2 s.

use crate::config::ProcessorConfig;
use crate::error::WorkbenchError;
use crate::pipeline::encode::EncodedImage;
use crate::prompts::window_request_text;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Turns page images into Markdown text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `images` (in page order) following `prompt`.
    ///
    /// Fails with [`WorkbenchError::TranscribeFailed`] carrying the
    /// provider's message.
    async fn transcribe(
        &self,
        images: &[EncodedImage],
        prompt: &str,
    ) -> Result<String, WorkbenchError>;
}

/// [`Transcriber`] backed by an `edgequake-llm` vision provider.
pub struct VisionTranscriber {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VisionTranscriber {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ProcessorConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ProcessorConfig) -> Result<Self, WorkbenchError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl Transcriber for VisionTranscriber {
    async fn transcribe(
        &self,
        images: &[EncodedImage],
        prompt: &str,
    ) -> Result<String, WorkbenchError> {
        let start = Instant::now();
        let page_nums: Vec<usize> = images.iter().map(|i| i.page_num).collect();
        let text = window_request_text(prompt, &page_nums);
        let messages = vec![ChatMessage::user_with_images(
            &text,
            images.iter().map(EncodedImage::to_image_data).collect(),
        )];

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Pages {:?}: retry {}/{} after {}ms",
                    page_nums, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "Pages {:?}: {} input tokens, {} output tokens, {:?}",
                        page_nums,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!(
                        "Pages {:?}: attempt {} failed: {}",
                        page_nums,
                        attempt + 1,
                        err_msg
                    );
                    last_err = Some(err_msg);
                }
            }
        }

        Err(WorkbenchError::TranscribeFailed {
            message: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Build `CompletionOptions` from the processor config.
fn build_options(config: &ProcessorConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built provider (`config.provider`)
/// 2. named provider + model (`config.provider_name`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is present
/// 5. `ProviderFactory::from_env()` auto-detection
pub fn resolve_provider(config: &ProcessorConfig) -> Result<Arc<dyn LLMProvider>, WorkbenchError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| WorkbenchError::ProviderNotConfigured {
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

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, WorkbenchError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        WorkbenchError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
