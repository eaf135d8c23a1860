//! Text extraction for supported document formats.
//!
//! Extraction is byte-oriented: the scanner supplies file bytes plus the
//! lowercase extension; this module returns plain UTF-8 text or an
//! [`ExtractError`]. Extraction never panics on bad input; the pipeline
//! skips the item and carries on.

/// Why a file produced no text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),
    /// Corrupted, encrypted, or otherwise unparseable PDF.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8 text")]
    InvalidUtf8,
}

/// Extract plain text from file contents, dispatching on extension.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension {
        "pdf" => extract_pdf(bytes),
        "txt" | "md" => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::InvalidUtf8),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

/// Whether extracted text has nothing worth indexing.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
