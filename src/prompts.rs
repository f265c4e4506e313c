//! Instructional prompts sent alongside page images.
//!
//! Kept short on purpose: long rule lists cost input tokens on every window
//! and made the model drop text on dense pages. Callers can override the
//! prompt via [`crate::config::ProcessorConfig::prompt`].

/// Default prompt for transcribing one or more page images.
pub const DEFAULT_OCR_PROMPT: &str = "Convert this PDF page to Markdown. \
Preserve all text, headings, and footnotes (use [^1] format).";

/// Prompt for pages laid out in two columns.
pub const TWO_COLUMN_OCR_PROMPT: &str = "Give me a clean Markdown-formatted \
transcription of this two-column PDF page. Read LEFT column first (top to bottom), \
then RIGHT column (top to bottom). Include all text and preserve structure.";

/// Label announcing a page image inside a multi-image request.
pub fn page_label(page_num: usize) -> String {
    format!("--- PAGE {page_num} ---")
}

/// Full request text for a window: the prompt followed by one label per
/// image, in the same order as the attached images.
pub fn window_request_text(prompt: &str, page_nums: &[usize]) -> String {
    let mut text = String::from(prompt);
    for &p in page_nums {
        text.push_str("\n\n");
        text.push_str(&page_label(p));
    }
    text
}
