//! Fakes shared by the integration tests: no pdfium, no API key.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_ocr_workbench::pipeline::encode::EncodedImage;
use edgequake_ocr_workbench::{
    ChunkProcessor, OcrService, PageRenderer, ProcessorConfig, ServiceConfig, Transcriber,
    WorkbenchError,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const POLL: Duration = Duration::from_millis(5);

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Renders a small solid image for every page of a document of `pages` pages.
pub struct FakeRenderer {
    pub pages: usize,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn page_count(&self, pdf_path: &Path) -> Result<usize, WorkbenchError> {
        if !pdf_path.exists() {
            return Err(WorkbenchError::FileNotFound {
                path: pdf_path.to_path_buf(),
            });
        }
        Ok(self.pages)
    }

    async fn render_page(
        &self,
        _pdf_path: &Path,
        page_index: usize,
    ) -> Result<DynamicImage, WorkbenchError> {
        if page_index >= self.pages {
            return Err(WorkbenchError::PageOutOfRange {
                page: page_index + 1,
                total: self.pages,
            });
        }
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            8,
            8,
            Rgba([255, 255, 255, 255]),
        )))
    }
}

/// Returns `Text of page N` (fenced, like a real model often does), failing
/// for any window that contains a page in `fail_on` and panicking for any
/// window that contains a page in `panic_on`.
pub struct FakeTranscriber {
    pub fail_on: HashSet<usize>,
    pub panic_on: HashSet<usize>,
    pub delay: Duration,
}

impl FakeTranscriber {
    pub fn new(fail_on: &[usize]) -> Self {
        Self {
            fail_on: fail_on.iter().copied().collect(),
            panic_on: HashSet::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_panic_on(mut self, pages: &[usize]) -> Self {
        self.panic_on = pages.iter().copied().collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        images: &[EncodedImage],
        _prompt: &str,
    ) -> Result<String, WorkbenchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let pages: Vec<usize> = images.iter().map(|i| i.page_num).collect();
        if pages.iter().any(|p| self.panic_on.contains(p)) {
            panic!("transcriber crashed on pages {pages:?}");
        }
        if pages.iter().any(|p| self.fail_on.contains(p)) {
            return Err(WorkbenchError::TranscribeFailed {
                message: "HTTP 500 from provider".into(),
            });
        }
        let body: Vec<String> = pages.iter().map(|p| format!("Text of page {p}")).collect();
        Ok(format!("```markdown\n{}\n```", body.join("\n\n")))
    }
}

/// Write a file that passes the `%PDF` magic check.
pub fn write_fake_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.4\n% fake body\n").unwrap();
    path
}

pub fn fake_pdf_bytes() -> Vec<u8> {
    b"%PDF-1.4\n% fake body\n".to_vec()
}

pub fn service_with(
    renderer: FakeRenderer,
    transcriber: FakeTranscriber,
    config: ServiceConfig,
) -> OcrService {
    let processor = ChunkProcessor::new(
        Arc::new(renderer),
        Arc::new(transcriber),
        ProcessorConfig::default(),
    );
    OcrService::new(processor, config)
}

pub fn service(root: &Path, pages: usize, fail_on: &[usize]) -> OcrService {
    service_with(
        FakeRenderer { pages },
        FakeTranscriber::new(fail_on),
        ServiceConfig::rooted_at(root),
    )
}
