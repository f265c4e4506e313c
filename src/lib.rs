//! # edgequake-ocr-workbench
//!
//! Page-range OCR orchestration: PDF pages → Vision LLM → Markdown, run as
//! pollable background jobs, with a batch workbench for large documents.
//!
//! ## Why jobs and batches?
//!
//! Transcribing a page through a vision model takes seconds; a 300-page book
//! takes long enough that no HTTP request should wait for it. Every run is a
//! background job with an id a client polls. Large documents are split into
//! fixed-size batches that can be started, retried and combined
//! independently, so one bad afternoon with a provider does not cost the
//! whole book.
//!
//! ## Architecture
//!
//! ```text
//!                     OcrService (explicit, cloneable handle)
//!  ┌───────────────┬──────────────┬────────────────┬──────────────┐
//!  │ JobTracker    │ Document     │ ChunkProcessor │ ResultStore  │
//!  │ id → snapshot │ Registry     │ one page range │ ref → file   │
//!  └───────▲───────┴──────┬───────┴───────┬────────┴──────▲───────┘
//!          │ progress     │ batch plan    │ windows       │ Markdown
//!          └──────────────┴── worker task ┴───────────────┘
//!
//!  window: render (pdfium) → encode (PNG / JPEG ladder) → transcribe (VLM)
//!          → strip fences → append "## Pages a-b"
//! ```
//!
//! A window that fails is logged and skipped; the job still completes and
//! its snapshot reports how many windows were skipped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr_workbench::{OcrService, ProcessorConfig, ServiceConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let service = OcrService::from_config(
//!         ProcessorConfig::default(),
//!         ServiceConfig::rooted_at("./ocr-out"),
//!     )?;
//!     let ticket = service.submit_document("paper.pdf", None, Some(10)).await?;
//!     let done = service.wait_for(&ticket.job_id, Duration::from_millis(500)).await?;
//!     if let Some(reference) = done.result {
//!         println!("{}", service.read_result(&reference).await?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-workbench` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod documents;
pub mod error;
pub mod ids;
pub mod jobs;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod results;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{Batch, BatchStatus};
pub use config::{
    ProcessorConfig, ProcessorConfigBuilder, PromptStyle, ServiceConfig, WindowFailurePolicy,
};
pub use documents::{Document, DocumentRegistry, DocumentSummary};
pub use error::{ErrorKind, WindowError, WorkbenchError};
pub use jobs::{JobProgress, JobSnapshot, JobStatus, JobTracker};
pub use pipeline::llm::{Transcriber, VisionTranscriber};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use processor::{ChunkProcessor, FileSink, OutputSink, ProcessReport};
pub use progress::{ChannelProgress, NoopProgress, ProgressSink, ProgressUpdate};
pub use results::{ResultRef, ResultStore};
pub use service::{BatchTicket, JobTicket, OcrService, UploadReceipt};
