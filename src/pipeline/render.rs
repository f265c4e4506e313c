//! Page rasterisation behind the [`PageRenderer`] seam.
//!
//! The chunk processor only needs two things from a PDF engine: how many
//! pages a document has, and one page as an image. Keeping that behind a
//! trait lets tests drive the processor with synthetic images and no pdfium
//! library installed.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and not
//! async-safe. Every call runs on Tokio's blocking pool so worker threads
//! never stall during rendering.

use crate::error::WorkbenchError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rasterises pages of a document on disk.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, pdf_path: &Path) -> Result<usize, WorkbenchError>;

    /// Render one page (0-indexed). Fails with
    /// [`WorkbenchError::PageOutOfRange`] when `page_index` is past the end.
    async fn render_page(
        &self,
        pdf_path: &Path,
        page_index: usize,
    ) -> Result<DynamicImage, WorkbenchError>;
}

/// [`PageRenderer`] backed by pdfium.
///
/// Binds to `PDFIUM_LIB_PATH` (a file or directory) when set, otherwise to
/// the system library.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    scale: f32,
    max_pixels: u32,
    password: Option<String>,
    library_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(scale: f32, max_pixels: u32) -> Self {
        Self {
            scale,
            max_pixels,
            password: None,
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Build from the processor's render settings.
    pub fn from_config(config: &crate::config::ProcessorConfig) -> Self {
        let mut renderer = Self::new(config.render_scale, config.max_rendered_pixels);
        renderer.password = config.password.clone();
        renderer
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn page_count(&self, pdf_path: &Path) -> Result<usize, WorkbenchError> {
        let this = self.clone();
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let pdfium = this.bind()?;
            let document = this.open(&pdfium, &path)?;
            let count = document.pages().len() as usize;
            Ok(count)
        })
        .await
        .map_err(|e| WorkbenchError::Internal(format!("Page-count task panicked: {}", e)))?
    }

    async fn render_page(
        &self,
        pdf_path: &Path,
        page_index: usize,
    ) -> Result<DynamicImage, WorkbenchError> {
        let this = self.clone();
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || this.render_blocking(&path, page_index))
            .await
            .map_err(|e| WorkbenchError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRenderer {
    fn bind(&self) -> Result<Pdfium, WorkbenchError> {
        let bindings = match &self.library_path {
            Some(p) if p.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(p))
            }
            Some(p) => Pdfium::bind_to_library(p),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| WorkbenchError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    fn open<'a>(
        &'a self,
        pdfium: &'a Pdfium,
        pdf_path: &Path,
    ) -> Result<PdfDocument<'a>, WorkbenchError> {
        pdfium
            .load_pdf_from_file(pdf_path, self.password.as_deref())
            .map_err(|e| WorkbenchError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })
    }

    fn render_blocking(
        &self,
        pdf_path: &Path,
        page_index: usize,
    ) -> Result<DynamicImage, WorkbenchError> {
        let pdfium = self.bind()?;
        let document = self.open(&pdfium, pdf_path)?;
        let pages = document.pages();
        let total = pages.len() as usize;

        if page_index >= total {
            return Err(WorkbenchError::PageOutOfRange {
                page: page_index + 1,
                total,
            });
        }

        let page = pages
            .get(page_index as u16)
            .map_err(|e| WorkbenchError::RenderFailed {
                page: page_index + 1,
                detail: format!("{:?}", e),
            })?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.scale)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| WorkbenchError::RenderFailed {
                page: page_index + 1,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
