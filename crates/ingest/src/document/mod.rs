pub mod chunker;
mod pdf;
mod txt;

use std::path::Path;

use ecrag_core::{Page, SourceDocument};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract pages from file bytes based on the file extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<Vec<Page>, ExtractionError> {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "pdf" => pdf::extract_pdf(bytes),
        "txt" | "text" | "md" | "markdown" => txt::extract_txt(bytes),
        other => Err(ExtractionError::UnsupportedType(other.to_string())),
    }
}

/// Read and extract a knowledge source from disk.
///
/// A missing file is reported as [`ExtractionError::NotFound`] so callers can skip it
/// without confusing it with a corrupt document.
pub fn load_source(path: impl AsRef<Path>) -> Result<SourceDocument, ExtractionError> {
    let path = path.as_ref();
    let source = path.display().to_string();
    if !path.is_file() {
        return Err(ExtractionError::NotFound(source));
    }
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.clone());
    let pages = extract_text(&bytes, &filename)?;
    Ok(SourceDocument { source, pages })
}
