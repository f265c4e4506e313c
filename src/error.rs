//! Error types for the OCR workbench.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`WorkbenchError`]: **Fatal** for the operation that returned it:
//!   unknown job or document, invalid upload, unreadable PDF, output file
//!   that cannot be written. Submissions return it synchronously before any
//!   worker is spawned; a worker that hits one ends its job in `error`.
//!
//! * [`WindowError`]: **Non-fatal**: one OCR window (a handful of pages)
//!   failed to render or transcribe. The chunk processor records it in its
//!   [`crate::processor::ProcessReport`] and moves on to the next window, so
//!   one bad page never costs the rest of the document.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`WorkbenchError`].
///
/// The HTTP layer maps these onto status codes; the library itself only uses
/// them for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown id, or a page / batch index outside its range.
    NotFound,
    /// Bad input rejected before any work started.
    Validation,
    /// The renderer or the transcription provider failed.
    Provider,
    /// An output or upload file could not be written.
    Io,
    /// Anything else (panicked task, runtime construction).
    Internal,
}

/// All fatal errors returned by the workbench.
#[derive(Debug, Error)]
pub enum WorkbenchError {
    // ── Not found ─────────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// No job has been registered under this id.
    #[error("Job not found: '{job_id}'")]
    JobNotFound { job_id: String },

    /// No document has been registered under this id.
    #[error("Document not found: '{doc_id}'")]
    DocumentNotFound { doc_id: String },

    /// Batch index is not in `0..len`.
    #[error("Batch index {index} is out of range (document has {len} batches)")]
    BatchOutOfRange { index: usize, len: usize },

    /// Requested page lies outside the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Result reference does not resolve to a file.
    #[error("Result '{reference}' not found or expired")]
    ResultNotFound { reference: String },

    // ── Validation ────────────────────────────────────────────────────────
    /// The input string is neither a readable path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The file was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: Vec<u8> },

    /// The upload carried no bytes.
    #[error("Uploaded file '{filename}' is empty")]
    EmptyFile { filename: String },

    /// Batch size must be at least one page.
    #[error("Batch size must be ≥ 1, got {batch_size}")]
    InvalidBatchSize { batch_size: usize },

    /// The batch already has a running job; wait for it before restarting.
    #[error("Batch {index} is already processing (job '{job_id}')")]
    BatchInProgress { index: usize, job_id: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `combine` was asked for a document with no completed batch.
    #[error("No completed batches to combine for document '{doc_id}'")]
    NothingToCombine { doc_id: String },

    // ── Provider ──────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt, or the password is missing/wrong.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page could not be rasterised.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The configured provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The transcription call failed after all retries.
    #[error("Transcription failed: {message}")]
    TranscribeFailed { message: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// HTTP URL was syntactically valid but the download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── I/O ───────────────────────────────────────────────────────────────
    /// Could not create or append to the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not persist an uploaded PDF.
    #[error("Failed to store upload '{filename}': {source}")]
    UploadWriteFailed {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkbenchError {
    /// Classify this error into the four-way taxonomy plus `Internal`.
    pub fn kind(&self) -> ErrorKind {
        use WorkbenchError::*;
        match self {
            FileNotFound { .. }
            | JobNotFound { .. }
            | DocumentNotFound { .. }
            | BatchOutOfRange { .. }
            | PageOutOfRange { .. }
            | ResultNotFound { .. } => ErrorKind::NotFound,
            InvalidInput { .. }
            | NotAPdf { .. }
            | EmptyFile { .. }
            | InvalidBatchSize { .. }
            | BatchInProgress { .. }
            | InvalidConfig(_)
            | NothingToCombine { .. } => ErrorKind::Validation,
            CorruptPdf { .. }
            | RenderFailed { .. }
            | ProviderNotConfigured { .. }
            | TranscribeFailed { .. }
            | PdfiumBindingFailed(_)
            | DownloadFailed { .. }
            | DownloadTimeout { .. } => ErrorKind::Provider,
            OutputWriteFailed { .. } | UploadWriteFailed { .. } => ErrorKind::Io,
            Internal(_) => ErrorKind::Internal,
        }
    }
}

/// A non-fatal error for a single OCR window.
///
/// `first` and `last` are the window's 1-indexed inclusive page bounds.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowError {
    /// One of the window's pages could not be rasterised.
    #[error("Pages {first}-{last}: rasterisation failed: {detail}")]
    RenderFailed {
        first: usize,
        last: usize,
        detail: String,
    },

    /// An image could not be encoded under the size ceiling.
    #[error("Pages {first}-{last}: image encoding failed: {detail}")]
    EncodeFailed {
        first: usize,
        last: usize,
        detail: String,
    },

    /// The transcription provider returned an error.
    #[error("Pages {first}-{last}: transcription failed: {detail}")]
    TranscribeFailed {
        first: usize,
        last: usize,
        detail: String,
    },
}

impl WindowError {
    /// The window's 1-indexed inclusive page range.
    pub fn pages(&self) -> (usize, usize) {
        match self {
            WindowError::RenderFailed { first, last, .. }
            | WindowError::EncodeFailed { first, last, .. }
            | WindowError::TranscribeFailed { first, last, .. } => (*first, *last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_out_of_range_display() {
        let e = WorkbenchError::BatchOutOfRange { index: 5, len: 5 };
        let msg = e.to_string();
        assert!(msg.contains("5 batches"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn nothing_to_combine_is_validation() {
        let e = WorkbenchError::NothingToCombine {
            doc_id: "doc_1".into(),
        };
        assert!(e.to_string().contains("doc_1"));
        assert_eq!(e.kind(), ErrorKind::Validation);
    }

    #[test]
    fn output_write_failed_is_io() {
        let e = WorkbenchError::OutputWriteFailed {
            path: PathBuf::from("/nope/out.md"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(e.kind(), ErrorKind::Io);
        assert!(e.to_string().contains("/nope/out.md"));
    }

    #[test]
    fn transcribe_failed_is_provider() {
        let e = WorkbenchError::TranscribeFailed {
            message: "HTTP 500".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Provider);
    }

    #[test]
    fn window_error_pages() {
        let e = WindowError::TranscribeFailed {
            first: 2,
            last: 3,
            detail: "boom".into(),
        };
        assert_eq!(e.pages(), (2, 3));
        assert!(e.to_string().starts_with("Pages 2-3"));
    }
}
