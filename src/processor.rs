//! The chunk processor: one contiguous page range → Markdown, window by window.
//!
//! ```text
//! for each window [first..=last] in ascending page order:
//!     progress.on_window_start(first, total)
//!     render pages ─▶ encode under ceiling ─▶ transcribe ─▶ strip fences
//!     append "## Pages first-last" + text to the sink
//! ```
//!
//! A window that fails to render or transcribe is logged, recorded in the
//! [`ProcessReport`] and skipped; the next window runs as if nothing
//! happened. Only two things end a run early: the document cannot be opened
//! at all, or the output sink cannot be written.
//!
//! Output is appended as each window completes, so a reader of the sink sees
//! partial results while later windows are still in flight. Within a window
//! output is all-or-nothing.

use crate::config::{ProcessorConfig, WindowFailurePolicy};
use crate::error::{WindowError, WorkbenchError};
use crate::pipeline::encode::{encode_page, EncodedImage};
use crate::pipeline::llm::{Transcriber, VisionTranscriber};
use crate::pipeline::postprocess::clean_window_text;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

/// Divider written after every window's text.
pub const SECTION_DIVIDER: &str = "\n\n---\n\n";

/// `Pages first-last` (1-indexed, inclusive).
pub fn page_range_label(first: usize, last: usize) -> String {
    format!("Pages {first}-{last}")
}

// ── Output sinks ─────────────────────────────────────────────────────────

/// Destination for assembled Markdown. Appends must land in call order.
#[async_trait]
pub trait OutputSink: Send {
    async fn append(&mut self, text: &str) -> Result<(), WorkbenchError>;
}

/// In-memory sink, mostly for tests and small documents.
#[async_trait]
impl OutputSink for String {
    async fn append(&mut self, text: &str) -> Result<(), WorkbenchError> {
        self.push_str(text);
        Ok(())
    }
}

/// Sink that appends to a Markdown file, flushing after every window so the
/// file on disk always holds every finished window.
pub struct FileSink {
    path: PathBuf,
    file: tokio::fs::File,
}

impl FileSink {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, WorkbenchError> {
        let path = path.as_ref().to_path_buf();
        let write_err = |source| WorkbenchError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let file = tokio::fs::File::create(&path).await.map_err(write_err)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutputSink for FileSink {
    async fn append(&mut self, text: &str) -> Result<(), WorkbenchError> {
        self.file
            .write_all(text.as_bytes())
            .await
            .map_err(|source| WorkbenchError::OutputWriteFailed {
                path: self.path.clone(),
                source,
            })?;
        self.file
            .flush()
            .await
            .map_err(|source| WorkbenchError::OutputWriteFailed {
                path: self.path.clone(),
                source,
            })
    }
}

// ── Report ───────────────────────────────────────────────────────────────

/// What happened during one [`ChunkProcessor::process`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    /// Page count of the whole document.
    pub total_pages: usize,
    /// First processed page, 1-indexed.
    pub first_page: usize,
    /// Last processed page, 1-indexed (inclusive).
    pub last_page: usize,
    /// Windows attempted.
    pub windows: usize,
    /// Windows whose text reached the sink.
    pub succeeded: usize,
    /// Windows that were skipped, in page order.
    pub failures: Vec<WindowError>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl ProcessReport {
    pub fn skipped_windows(&self) -> usize {
        self.failures.len()
    }

    /// `true` when every window made it into the output.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Processor ────────────────────────────────────────────────────────────

/// Drives a page range through render → transcribe → clean → append.
pub struct ChunkProcessor {
    renderer: Arc<dyn PageRenderer>,
    transcriber: Arc<dyn Transcriber>,
    config: ProcessorConfig,
}

impl ChunkProcessor {
    /// A `chunk_size` of zero is treated as one page per window.
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        transcriber: Arc<dyn Transcriber>,
        mut config: ProcessorConfig,
    ) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        Self {
            renderer,
            transcriber,
            config,
        }
    }

    /// Pdfium renderer + VLM transcriber resolved from `config`.
    pub fn from_config(config: ProcessorConfig) -> Result<Self, WorkbenchError> {
        let renderer = Arc::new(PdfiumRenderer::from_config(&config));
        let transcriber = Arc::new(VisionTranscriber::from_config(&config)?);
        Ok(Self::new(renderer, transcriber, config))
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The renderer, also used as the page-count probe at submission time.
    pub fn renderer(&self) -> &dyn PageRenderer {
        self.renderer.as_ref()
    }

    pub async fn page_count(&self, pdf_path: &Path) -> Result<usize, WorkbenchError> {
        self.renderer.page_count(pdf_path).await
    }

    /// Transcribe `page_count` pages starting at 0-indexed `start_page`
    /// (default: the rest of the document) into `sink`.
    ///
    /// # Errors
    /// Fails only when the document cannot be opened, `start_page` is past
    /// the end, or `sink` cannot be written. Window failures are reported in
    /// the returned [`ProcessReport`].
    pub async fn process(
        &self,
        pdf_path: &Path,
        start_page: usize,
        page_count: Option<usize>,
        sink: &mut dyn OutputSink,
        progress: &dyn ProgressSink,
    ) -> Result<ProcessReport, WorkbenchError> {
        let started = Instant::now();
        let total = self.renderer.page_count(pdf_path).await?;
        if start_page >= total {
            return Err(WorkbenchError::PageOutOfRange {
                page: start_page + 1,
                total,
            });
        }
        let end = match page_count {
            Some(n) => start_page.saturating_add(n).min(total),
            None => total,
        };

        info!(
            "Processing {}: pages {} to {} (total: {}), {} page(s) per window",
            pdf_path.display(),
            start_page + 1,
            end,
            total,
            self.config.chunk_size
        );

        let mut report = ProcessReport {
            total_pages: total,
            first_page: start_page + 1,
            last_page: end,
            ..Default::default()
        };
        let mut wrote_heading = false;

        for (window, first_idx) in (start_page..end).step_by(self.config.chunk_size).enumerate() {
            let last_idx = (first_idx + self.config.chunk_size).min(end) - 1;
            let (first, last) = (first_idx + 1, last_idx + 1);

            info!("Processing window {}: pages {}-{}", window + 1, first, last);
            progress.on_window_start(
                first,
                total,
                &format!("Processing page {} of {}...", first, total),
            );
            report.windows += 1;

            let section = match self.run_window(pdf_path, first_idx, last_idx).await {
                Ok(text) => {
                    report.succeeded += 1;
                    info!("Pages {}-{} completed", first, last);
                    Some(format!(
                        "## {}\n\n{}{}",
                        page_range_label(first, last),
                        text,
                        SECTION_DIVIDER
                    ))
                }
                Err(e) => {
                    error!("Pages {}-{} failed: {}", first, last, e);
                    progress.on_window_failed(first, last, &e.to_string());
                    let marker = match self.config.failure_policy {
                        WindowFailurePolicy::Omit => None,
                        WindowFailurePolicy::Marker => Some(format!(
                            "<!-- OCR failed for pages {}-{}: {} -->\n\n",
                            first,
                            last,
                            one_line(&e.to_string())
                        )),
                    };
                    report.failures.push(e);
                    marker
                }
            };

            if let Some(section) = section {
                if !wrote_heading {
                    sink.append(&format!("# {}\n\n", self.config.document_heading))
                        .await?;
                    wrote_heading = true;
                }
                sink.append(&section).await?;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Processing complete: {}/{} windows, {}ms",
            report.succeeded, report.windows, report.duration_ms
        );
        Ok(report)
    }

    /// Render, encode and transcribe pages `first_idx..=last_idx` (0-indexed).
    async fn run_window(
        &self,
        pdf_path: &Path,
        first_idx: usize,
        last_idx: usize,
    ) -> Result<String, WindowError> {
        let (first, last) = (first_idx + 1, last_idx + 1);
        let mut images: Vec<EncodedImage> = Vec::with_capacity(last_idx - first_idx + 1);

        for idx in first_idx..=last_idx {
            let image = self
                .renderer
                .render_page(pdf_path, idx)
                .await
                .map_err(|e| WindowError::RenderFailed {
                    first,
                    last,
                    detail: e.to_string(),
                })?;
            let encoded = encode_page(
                idx + 1,
                &image,
                self.config.max_image_bytes,
                &self.config.jpeg_quality_ladder,
            )
            .map_err(|e| WindowError::EncodeFailed {
                first,
                last,
                detail: e.to_string(),
            })?;
            images.push(encoded);
        }

        let raw = self
            .transcriber
            .transcribe(&images, self.config.effective_prompt())
            .await
            .map_err(|e| WindowError::TranscribeFailed {
                first,
                last,
                detail: e.to_string(),
            })?;

        Ok(clean_window_text(&raw))
    }
}

/// Keep markers on one line so they stay a single HTML comment.
fn one_line(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("-->", "->")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{ChannelProgress, NoopProgress};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeRenderer {
        pages: usize,
        broken: HashSet<usize>,
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn page_count(&self, _pdf_path: &Path) -> Result<usize, WorkbenchError> {
            Ok(self.pages)
        }

        async fn render_page(
            &self,
            _pdf_path: &Path,
            page_index: usize,
        ) -> Result<DynamicImage, WorkbenchError> {
            if self.broken.contains(&page_index) {
                return Err(WorkbenchError::RenderFailed {
                    page: page_index + 1,
                    detail: "bad xobject".into(),
                });
            }
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                4,
                4,
                Rgba([page_index as u8, 0, 0, 255]),
            )))
        }
    }

    /// Echoes the page numbers it saw; fails for windows containing `fail_on`.
    struct FakeTranscriber {
        fail_on: HashSet<usize>,
        calls: Mutex<Vec<Vec<usize>>>,
    }

    impl FakeTranscriber {
        fn new(fail_on: &[usize]) -> Self {
            Self {
                fail_on: fail_on.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(
            &self,
            images: &[EncodedImage],
            _prompt: &str,
        ) -> Result<String, WorkbenchError> {
            let pages: Vec<usize> = images.iter().map(|i| i.page_num).collect();
            self.calls.lock().unwrap().push(pages.clone());
            if pages.iter().any(|p| self.fail_on.contains(p)) {
                return Err(WorkbenchError::TranscribeFailed {
                    message: "HTTP 500".into(),
                });
            }
            Ok(format!("```markdown\ntext of {:?}\n```", pages))
        }
    }

    fn processor(
        pages: usize,
        broken: &[usize],
        fail_on: &[usize],
        config: ProcessorConfig,
    ) -> (ChunkProcessor, Arc<FakeTranscriber>) {
        let transcriber = Arc::new(FakeTranscriber::new(fail_on));
        let renderer = Arc::new(FakeRenderer {
            pages,
            broken: broken.iter().copied().collect(),
        });
        (
            ChunkProcessor::new(renderer, transcriber.clone(), config),
            transcriber,
        )
    }

    #[tokio::test]
    async fn middle_page_failure_is_skipped() {
        let (p, _) = processor(3, &[], &[2], ProcessorConfig::default());
        let mut out = String::new();
        let report = p
            .process(Path::new("doc.pdf"), 0, None, &mut out, &NoopProgress)
            .await
            .unwrap();

        assert!(out.starts_with("# OCR Results\n\n## Pages 1-1\n\ntext of [1]"));
        let one = out.find("## Pages 1-1").unwrap();
        let three = out.find("## Pages 3-3").unwrap();
        assert!(one < three);
        assert!(!out.contains("Pages 2-2"));
        assert!(!out.contains("```"));
        assert_eq!(report.windows, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.skipped_windows(), 1);
        assert_eq!(report.failures[0].pages(), (2, 2));
    }

    #[tokio::test]
    async fn windows_respect_chunk_size_and_range() {
        let config = ProcessorConfig::builder().chunk_size(2).build().unwrap();
        let (p, t) = processor(10, &[], &[], config);
        let mut out = String::new();
        let report = p
            .process(Path::new("doc.pdf"), 2, Some(5), &mut out, &NoopProgress)
            .await
            .unwrap();

        let calls = t.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![vec![3, 4], vec![5, 6], vec![7]]);
        assert_eq!((report.first_page, report.last_page), (3, 7));
        assert!(out.contains("## Pages 3-4\n\n"));
        assert!(out.contains("## Pages 7-7\n\n"));
    }

    #[tokio::test]
    async fn zero_chunk_size_from_struct_literal_runs_single_pages() {
        let config = ProcessorConfig {
            chunk_size: 0,
            ..Default::default()
        };
        let (p, t) = processor(3, &[], &[], config);
        assert_eq!(p.config().chunk_size, 1);

        let mut out = String::new();
        let report = p
            .process(Path::new("doc.pdf"), 0, None, &mut out, &NoopProgress)
            .await
            .unwrap();
        assert_eq!(report.windows, 3);
        assert_eq!(t.calls.lock().unwrap().clone(), vec![vec![1], vec![2], vec![3]]);
    }

    #[tokio::test]
    async fn page_count_is_capped_at_document_end() {
        let (p, t) = processor(4, &[], &[], ProcessorConfig::default());
        let mut out = String::new();
        let report = p
            .process(Path::new("doc.pdf"), 2, Some(100), &mut out, &NoopProgress)
            .await
            .unwrap();
        assert_eq!(report.windows, 2);
        assert_eq!(t.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn render_failure_skips_whole_window() {
        let config = ProcessorConfig::builder().chunk_size(2).build().unwrap();
        let (p, t) = processor(4, &[2], &[], config);
        let mut out = String::new();
        let report = p
            .process(Path::new("doc.pdf"), 0, None, &mut out, &NoopProgress)
            .await
            .unwrap();

        assert!(matches!(
            report.failures[0],
            WindowError::RenderFailed { first: 3, last: 4, .. }
        ));
        // Transcriber never saw the broken window.
        assert_eq!(t.calls.lock().unwrap().clone(), vec![vec![1, 2]]);
        assert!(!out.contains("Pages 3-4"));
    }

    #[tokio::test]
    async fn marker_policy_writes_comment() {
        let config = ProcessorConfig::builder()
            .failure_policy(WindowFailurePolicy::Marker)
            .build()
            .unwrap();
        let (p, _) = processor(2, &[], &[1], config);
        let mut out = String::new();
        p.process(Path::new("doc.pdf"), 0, None, &mut out, &NoopProgress)
            .await
            .unwrap();

        assert!(out.starts_with("# OCR Results\n\n<!-- OCR failed for pages 1-1:"));
        assert!(out.contains("## Pages 2-2"));
        assert!(!out.contains("## Pages 1-1"));
    }

    #[tokio::test]
    async fn progress_is_reported_before_each_window() {
        let (p, _) = processor(3, &[], &[2], ProcessorConfig::default());
        let (sink, mut rx) = ChannelProgress::new();
        let mut out = String::new();
        p.process(Path::new("doc.pdf"), 0, None, &mut out, &sink)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(u) = rx.try_recv() {
            assert_eq!(u.total_pages, 3);
            seen.push(u.current_page);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn start_past_end_is_not_found() {
        let (p, _) = processor(3, &[], &[], ProcessorConfig::default());
        let mut out = String::new();
        let err = p
            .process(Path::new("doc.pdf"), 3, None, &mut out, &NoopProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::PageOutOfRange { page: 4, total: 3 }));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn all_windows_failing_leaves_empty_output() {
        let (p, _) = processor(2, &[], &[1, 2], ProcessorConfig::default());
        let mut out = String::new();
        let report = p
            .process(Path::new("doc.pdf"), 0, None, &mut out, &NoopProgress)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(report.succeeded, 0);
        assert!(!report.is_complete());
    }

    struct BrokenSink;

    #[async_trait]
    impl OutputSink for BrokenSink {
        async fn append(&mut self, _text: &str) -> Result<(), WorkbenchError> {
            Err(WorkbenchError::OutputWriteFailed {
                path: PathBuf::from("/dev/full"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }
    }

    #[tokio::test]
    async fn sink_failure_is_fatal() {
        let (p, t) = processor(3, &[], &[], ProcessorConfig::default());
        let err = p
            .process(Path::new("doc.pdf"), 0, None, &mut BrokenSink, &NoopProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::OutputWriteFailed { .. }));
        assert_eq!(t.calls.lock().unwrap().len(), 1, "stops at the first write");
    }

    #[tokio::test]
    async fn file_sink_appends_incrementally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.md");
        let mut sink = FileSink::create(&path).await.unwrap();
        sink.append("a").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a");
        sink.append("b").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ab");
    }

    #[test]
    fn one_line_flattens_and_defuses_comment_end() {
        assert_eq!(one_line("a\n  b --> c"), "a b -> c");
    }
}
