//! Post-processing: strip the code-fence wrapper providers add around
//! otherwise plain Markdown.
//!
//! Even when told not to, models frequently answer with
//!
//! ````text
//! ```markdown
//! # Page title
//! ...
//! ```
//! ````
//!
//! The wrapper must go before the text is appended to the document, or every
//! window would render as one giant code block. Only the *outer* wrapper is
//! removed: fenced code blocks that belong to the page content stay intact.

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening fence with an optional language tag, up to the end of its line.
static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+.-]*[ \t]*(?:\r?\n|$)").unwrap());

/// Clean one window's raw transcriber response.
///
/// Normalises line endings, strips the outer fence wrapper and trims
/// surrounding whitespace.
pub fn clean_window_text(raw: &str) -> String {
    let normalised = raw.replace("\r\n", "\n").replace('\r', "\n");
    strip_code_fences(&normalised).trim().to_string()
}

/// Remove a single leading fence (with or without a language tag) and a
/// single trailing fence.
///
/// Text that neither starts nor ends with a fence is returned unchanged. A
/// trailing fence is only removed when it closes the stripped leading fence,
/// or when it is unmatched (odd number of fence lines); a page that simply
/// ends with its own code block keeps its closing fence.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    let starts = trimmed.starts_with("```");
    let ends = trimmed.ends_with("```");
    if !starts && !ends {
        return input.to_string();
    }

    let mut body = trimmed;
    let mut stripped_leading = false;
    if starts {
        if let Some(m) = RE_LEADING_FENCE.find(body) {
            body = &body[m.end()..];
        } else {
            // "```# Title": fence glued to content, drop just the backticks.
            body = &body[3..];
        }
        stripped_leading = true;
    }

    let body = body.trim();
    let unmatched_closer = fence_line_count(body) % 2 == 1;
    if body.ends_with("```") && (stripped_leading || unmatched_closer) {
        return body[..body.len() - 3].trim().to_string();
    }
    body.to_string()
}

fn fence_line_count(text: &str) -> usize {
    text.lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count()
}
