//! Upload helpers — local validation and the upload wire body.
//!
//! Files are checked before any bytes leave the client: only `.pdf`,
//! `.docx`, `.pptx` and `.txt` (any case) up to 10 MB are accepted. The
//! upload route takes the file base64-encoded inside a JSON body and answers
//! with the stored filename and the document title to open next.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Extensions the document pipeline can process.
pub const ACCEPTED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "pptx", "txt"];

/// Largest accepted upload, in bytes (10 MB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("file name must not be empty")]
    EmptyFileName,
    #[error("unsupported file type `{extension}`; accepted: PDF, DOCX, PPTX, TXT")]
    UnsupportedType { extension: String },
    #[error("file is too large ({size}); the limit is {limit}")]
    TooLarge { size: String, limit: String },
}

/// Check a file name and size against the upload rules.
///
/// # Errors
///
/// Returns the first rule the file breaks.
pub fn validate_file(filename: &str, size: u64) -> Result<(), UploadError> {
    let filename = filename.trim();
    if filename.is_empty() {
        return Err(UploadError::EmptyFileName);
    }

    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(UploadError::UnsupportedType { extension });
    }

    if size > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge { size: format_file_size(size), limit: format_file_size(MAX_UPLOAD_BYTES) });
    }
    Ok(())
}

/// Human-readable size with up to two decimals, e.g. `1.5 MB`.
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_owned();
    }

    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{value:.2}");
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{rendered} {}", SIZE_UNITS[unit])
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// JSON body of the upload route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub folder_name: String,
    pub filename: String,
    /// Base64 (standard alphabet, padded) file bytes.
    pub file_content: String,
}

impl UploadRequest {
    /// Validate and encode a file for upload.
    ///
    /// # Errors
    ///
    /// See [`validate_file`].
    pub fn new(folder: &str, filename: &str, bytes: &[u8]) -> Result<Self, UploadError> {
        validate_file(filename, bytes.len() as u64)?;
        Ok(Self {
            folder_name: folder.to_owned(),
            filename: filename.trim().to_owned(),
            file_content: STANDARD.encode(bytes),
        })
    }
}

/// What the upload route answers on success.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    /// Title to open the uploaded document by.
    #[serde(default)]
    pub document_name: Option<String>,
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod tests;
