//! Pipeline stages used by the chunk processor for each OCR window.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (path/URL) (pdfium)  (PNG/JPEG) (VLM)   (fence strip)
//! ```
//!
//! 1. [`input`] : validate the path, URL or upload before any work starts
//! 2. [`render`]: [`render::PageRenderer`] seam; pdfium runs in
//!    `spawn_blocking` because it is not async-safe
//! 3. [`encode`]: PNG first, JPEG quality ladder when over the size ceiling
//! 4. [`llm`]   : [`llm::Transcriber`] seam; VLM call with retry/backoff
//! 5. [`postprocess`]: strip the provider's outer code fence

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
