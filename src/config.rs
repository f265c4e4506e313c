//! Configuration types for OCR jobs and the workbench service.
//!
//! Two structs, two scopes:
//!
//! * [`ProcessorConfig`] controls *how one page range is transcribed*: window
//!   size, render scale, image size ceiling, prompt, provider. Built via
//!   [`ProcessorConfigBuilder`] so callers set only what they care about.
//! * [`ServiceConfig`] controls *where results live and how jobs are admitted*:
//!   output and upload directories, default batch size, page caps.

use crate::error::WorkbenchError;
use crate::prompts::{DEFAULT_OCR_PROMPT, TWO_COLUMN_OCR_PROMPT};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default size ceiling for one encoded page image (4 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// JPEG qualities tried, in order, when a PNG exceeds the size ceiling.
pub const DEFAULT_JPEG_QUALITY_LADDER: [u8; 4] = [85, 70, 60, 50];

/// Configuration for the chunk processor.
///
/// # Example
/// ```rust
/// use edgequake_ocr_workbench::ProcessorConfig;
///
/// let config = ProcessorConfig::builder()
///     .chunk_size(1)
///     .render_scale(2.0)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 1);
/// ```
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Pages sent to the transcriber in one call. Default: 1.
    ///
    /// Single-page windows are strongly recommended: multi-page windows risk
    /// exceeding the model's context and the provider's payload limits, and a
    /// failure costs every page in the window.
    pub chunk_size: usize,

    /// Resolution scale applied when rasterising a page. Default: 2.0.
    pub render_scale: f32,

    /// Cap on the rendered image's longest edge in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Byte ceiling for one encoded image. Default: 4 MiB.
    pub max_image_bytes: usize,

    /// JPEG qualities tried in order once PNG exceeds `max_image_bytes`.
    pub jpeg_quality_ladder: Vec<u8>,

    /// Which built-in prompt to use when `prompt` is `None`.
    pub prompt_style: PromptStyle,

    /// Custom instructional prompt. Overrides `prompt_style`.
    pub prompt: Option<String>,

    /// What a failed window contributes to the output. Default: omit it.
    pub failure_policy: WindowFailurePolicy,

    /// Top-level heading written before the first window. Default: "OCR Results".
    pub document_heading: String,

    /// LLM model identifier. If None, uses "gpt-4.1-nano".
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per window. Default: 16000.
    pub max_tokens: usize,

    /// Retries on a failed transcription call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1,
            render_scale: 2.0,
            max_rendered_pixels: 4000,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            jpeg_quality_ladder: DEFAULT_JPEG_QUALITY_LADDER.to_vec(),
            prompt_style: PromptStyle::default(),
            prompt: None,
            failure_policy: WindowFailurePolicy::default(),
            document_heading: "OCR Results".to_string(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 16000,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("chunk_size", &self.chunk_size)
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("jpeg_quality_ladder", &self.jpeg_quality_ladder)
            .field("prompt_style", &self.prompt_style)
            .field("failure_policy", &self.failure_policy)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }

    /// The instructional prompt sent with every window.
    pub fn effective_prompt(&self) -> &str {
        match (&self.prompt, self.prompt_style) {
            (Some(p), _) => p,
            (None, PromptStyle::Default) => DEFAULT_OCR_PROMPT,
            (None, PromptStyle::TwoColumn) => TWO_COLUMN_OCR_PROMPT,
        }
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 4.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_image_bytes(mut self, bytes: usize) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    pub fn jpeg_quality_ladder(mut self, ladder: Vec<u8>) -> Self {
        self.config.jpeg_quality_ladder = ladder;
        self
    }

    pub fn prompt_style(mut self, style: PromptStyle) -> Self {
        self.config.prompt_style = style;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn failure_policy(mut self, policy: WindowFailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn document_heading(mut self, heading: impl Into<String>) -> Self {
        self.config.document_heading = heading.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, WorkbenchError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(WorkbenchError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.max_image_bytes == 0 {
            return Err(WorkbenchError::InvalidConfig(
                "Image size ceiling must be > 0 bytes".into(),
            ));
        }
        if let Some(q) = c.jpeg_quality_ladder.iter().find(|q| **q == 0 || **q > 100) {
            return Err(WorkbenchError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {q}"
            )));
        }
        if c.document_heading.trim().is_empty() {
            return Err(WorkbenchError::InvalidConfig(
                "Document heading must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for [`crate::service::OcrService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory where finished Markdown files are written.
    pub output_dir: PathBuf,

    /// Directory where uploaded PDFs are stored for the workbench.
    pub upload_dir: PathBuf,

    /// Batch size used when an upload does not specify one. Default: 5.
    pub default_batch_size: usize,

    /// Optional cap on pages processed by a whole-document submission.
    pub max_document_pages: Option<usize>,

    /// Optional limit on jobs running at once. `None` spawns every job
    /// immediately.
    pub max_concurrent_jobs: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("ocr-workbench");
        Self {
            output_dir: base.join("results"),
            upload_dir: base.join("uploads"),
            default_batch_size: 5,
            max_document_pages: None,
            max_concurrent_jobs: None,
        }
    }
}

impl ServiceConfig {
    /// Place both output and uploads under `root`.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            output_dir: root.join("results"),
            upload_dir: root.join("uploads"),
            ..Self::default()
        }
    }

    pub fn with_max_document_pages(mut self, pages: usize) -> Self {
        self.max_document_pages = Some(pages);
        self
    }

    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = Some(n.max(1));
        self
    }

    pub fn with_default_batch_size(mut self, n: usize) -> Self {
        self.default_batch_size = n;
        self
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Built-in prompt selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// Plain page transcription with footnotes preserved. (default)
    #[default]
    Default,
    /// Read the left column top to bottom, then the right column.
    TwoColumn,
}

/// What a failed window contributes to the assembled output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFailurePolicy {
    /// Leave the window out entirely; the gap is visible only as a missing
    /// page-range heading. (default)
    #[default]
    Omit,
    /// Write an HTML comment marker naming the failed pages and the error.
    Marker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ProcessorConfig::default();
        assert_eq!(c.chunk_size, 1);
        assert_eq!(c.render_scale, 2.0);
        assert_eq!(c.max_image_bytes, 4 * 1024 * 1024);
        assert_eq!(c.jpeg_quality_ladder, vec![85, 70, 60, 50]);
        assert_eq!(c.failure_policy, WindowFailurePolicy::Omit);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let err = ProcessorConfig::builder().chunk_size(0).build().unwrap_err();
        assert!(matches!(err, WorkbenchError::InvalidConfig(_)));
    }

    #[test]
    fn bad_jpeg_quality_rejected() {
        let err = ProcessorConfig::builder()
            .jpeg_quality_ladder(vec![90, 0])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("1–100"));
    }

    #[test]
    fn render_scale_clamped() {
        let c = ProcessorConfig::builder().render_scale(10.0).build().unwrap();
        assert_eq!(c.render_scale, 4.0);
    }

    #[test]
    fn custom_prompt_wins_over_style() {
        let c = ProcessorConfig::builder()
            .prompt_style(PromptStyle::TwoColumn)
            .prompt("just transcribe")
            .build()
            .unwrap();
        assert_eq!(c.effective_prompt(), "just transcribe");

        let c = ProcessorConfig::builder()
            .prompt_style(PromptStyle::TwoColumn)
            .build()
            .unwrap();
        assert_eq!(c.effective_prompt(), TWO_COLUMN_OCR_PROMPT);
    }

    #[test]
    fn service_config_rooted() {
        let c = ServiceConfig::rooted_at("/srv/ocr").with_max_concurrent_jobs(0);
        assert_eq!(c.output_dir, PathBuf::from("/srv/ocr/results"));
        assert_eq!(c.upload_dir, PathBuf::from("/srv/ocr/uploads"));
        assert_eq!(c.max_concurrent_jobs, Some(1));
        assert_eq!(c.default_batch_size, 5);
    }
}
