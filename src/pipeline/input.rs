//! Input resolution and validation.
//!
//! Everything here runs synchronously with the submitting call, before a
//! worker is spawned, so bad input surfaces as a validation error to the
//! caller instead of a job that ends in `error`.
//!
//! ## Why download to a temp file?
//!
//! pdfium needs a file-system path. A URL input is downloaded into a
//! `TempDir`; the [`ResolvedInput`] owns that directory and is moved into the
//! worker, so the file lives exactly as long as the job that reads it.

use crate::error::WorkbenchError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input, either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory that is removed
    /// when this value is dropped.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the PDF regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL to a local, validated PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, WorkbenchError> {
    if input.trim().is_empty() {
        return Err(WorkbenchError::InvalidInput {
            input: input.to_string(),
            reason: "empty input".into(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        let path = PathBuf::from(input);
        validate_pdf_file(&path)?;
        debug!("Resolved local PDF: {}", path.display());
        Ok(ResolvedInput::Local(path))
    }
}

/// Validate that `path` exists, is non-empty, and starts with `%PDF`.
pub fn validate_pdf_file(path: &Path) -> Result<(), WorkbenchError> {
    let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => WorkbenchError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => WorkbenchError::InvalidInput {
            input: path.display().to_string(),
            reason: e.to_string(),
        },
    })?;

    let mut magic = [0u8; 4];
    let read = file
        .read(&mut magic)
        .map_err(|e| WorkbenchError::InvalidInput {
            input: path.display().to_string(),
            reason: e.to_string(),
        })?;
    if read == 0 {
        return Err(WorkbenchError::EmptyFile {
            filename: path.display().to_string(),
        });
    }
    check_magic(path, &magic[..read])
}

/// Validate an uploaded file before it is stored.
///
/// Rejects an empty filename, a non-`.pdf` extension, an empty body and a
/// body that does not start with the `%PDF` magic.
pub fn validate_upload(filename: &str, bytes: &[u8]) -> Result<(), WorkbenchError> {
    if filename.trim().is_empty() {
        return Err(WorkbenchError::InvalidInput {
            input: filename.to_string(),
            reason: "no file selected".into(),
        });
    }
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(WorkbenchError::InvalidInput {
            input: filename.to_string(),
            reason: "please upload a PDF file".into(),
        });
    }
    if bytes.is_empty() {
        return Err(WorkbenchError::EmptyFile {
            filename: filename.to_string(),
        });
    }
    check_magic(Path::new(filename), &bytes[..bytes.len().min(4)])
}

/// Reduce an uploaded filename to its final path component, keeping only
/// characters that are safe in a file name.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned
    }
}

fn check_magic(path: &Path, head: &[u8]) -> Result<(), WorkbenchError> {
    if head != b"%PDF" {
        return Err(WorkbenchError::NotAPdf {
            path: path.to_path_buf(),
            magic: head.to_vec(),
        });
    }
    Ok(())
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, WorkbenchError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| WorkbenchError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            WorkbenchError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            WorkbenchError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(WorkbenchError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| WorkbenchError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| WorkbenchError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if bytes.is_empty() {
        return Err(WorkbenchError::EmptyFile { filename });
    }
    check_magic(&file_path, &bytes[..bytes.len().min(4)])?;

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| WorkbenchError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return sanitize_filename(last);
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
