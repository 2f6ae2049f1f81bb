//! Document ingestion.
//!
//! Turns a file on disk into the plain text the assistant answers from.
//! PDFs go through `pdf-extract`; text-like formats are read as (lossy)
//! UTF-8.  Either way whitespace is collapsed and the result is capped at
//! [`MAX_DOCUMENT_CHARS`] characters.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Longest document text kept, in characters.
pub const MAX_DOCUMENT_CHARS: usize = 50_000;

const SUPPORTED_EXTENSIONS: [&str; 6] = ["pdf", "txt", "md", "markdown", "doc", "docx"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported file format: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from {}: {reason}", path.display())]
    Extract { path: PathBuf, reason: String },

    #[error("{} contains no text", .0.display())]
    Empty(PathBuf),
}

/// An ingested document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name shown to the user.
    pub name: String,
    /// Normalized text.
    pub content: String,
}

impl Document {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        if !is_supported(path) {
            return Err(DocumentError::Unsupported(path.to_path_buf()));
        }

        let bytes = std::fs::read(path).map_err(|source| DocumentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = if is_pdf(path) {
            extract_pdf_text(path, &bytes)?
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        let content = normalize_text(&raw);
        if content.is_empty() {
            return Err(DocumentError::Empty(path.to_path_buf()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        log::info!("document: loaded {name} ({} chars)", content.chars().count());
        Ok(Self { name, content })
    }
}

/// Whether the extension (case-insensitive) is one we can read.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// `pdf-extract` panics on some malformed files; those become
/// [`DocumentError::Extract`] like any other extraction failure.
fn extract_pdf_text(path: &Path, bytes: &[u8]) -> Result<String, DocumentError> {
    let extract_error = |reason: String| DocumentError::Extract {
        path: path.to_path_buf(),
        reason,
    };
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(extract_error(e.to_string())),
        Err(_) => Err(extract_error("malformed PDF".into())),
    }
}

/// Collapse whitespace runs to one space, trim, and cap the length.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_DOCUMENT_CHARS * 4));
    let mut count = 0;
    for word in raw.split_whitespace() {
        if count > 0 {
            if count == MAX_DOCUMENT_CHARS {
                break;
            }
            out.push(' ');
            count += 1;
        }
        for c in word.chars() {
            if count == MAX_DOCUMENT_CHARS {
                return out;
            }
            out.push(c);
            count += 1;
        }
    }
    out
}
