//! Upload Receiver
//!
//! Pulls the single `file` field out of a multipart submission, checks its
//! declared type and size, and persists it into the scratch directory.
//! Nothing is written until both checks pass.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::{header, HeaderMap, StatusCode};

use crate::scratch::{ScratchDir, ScratchFile};

/// The only accepted input kind
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

/// Room for multipart boundaries and part headers on top of the file itself
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// A validated upload living in the scratch directory
#[derive(Debug)]
pub struct UploadedFile {
    pub file: ScratchFile,
    pub original_name: String,
    pub declared_mime_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("File too large (max: {max} bytes)")]
    PayloadTooLarge { max: u64 },

    #[error("Failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl UploadError {
    fn from_multipart(err: MultipartError, max: u64) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge { max }
        } else {
            Self::InvalidInput(format!("Failed to read upload: {}", err.body_text()))
        }
    }
}

/// Reject a request whose declared `Content-Length` cannot fit `max_bytes`
/// plus multipart framing, before any of the body is buffered.
///
/// A missing or unparsable header is left to the streamed size check.
pub fn check_declared_length(headers: &HeaderMap, max_bytes: u64) -> Result<(), UploadError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    match declared {
        Some(length) if length > max_bytes.saturating_add(MULTIPART_OVERHEAD) => {
            tracing::warn!(content_length = length, max_bytes, "Rejected oversized request up front");
            Err(UploadError::PayloadTooLarge { max: max_bytes })
        }
        _ => Ok(()),
    }
}

/// Receive one PDF from `multipart` into `scratch`.
///
/// Fields other than `file` are skipped. The declared MIME type is checked
/// before any body bytes are read, and the body is buffered in memory so an
/// oversized upload is rejected before touching the disk.
pub async fn receive_pdf(
    multipart: &mut Multipart,
    scratch: &ScratchDir,
    max_bytes: u64,
) -> Result<UploadedFile, UploadError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::from_multipart(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            tracing::debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "document.pdf".to_string());
        let declared_mime_type = field.content_type().unwrap_or_default().to_string();

        if declared_mime_type != PDF_MIME_TYPE {
            tracing::warn!(
                file_name = %original_name,
                content_type = %declared_mime_type,
                "Rejected upload with unsupported type"
            );
            return Err(UploadError::InvalidInput("Only PDF files are allowed".to_string()));
        }

        let mut data: Vec<u8> = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| UploadError::from_multipart(e, max_bytes))?
        {
            if (data.len() + chunk.len()) as u64 > max_bytes {
                tracing::warn!(
                    file_name = %original_name,
                    max_bytes,
                    "Rejected oversized upload"
                );
                return Err(UploadError::PayloadTooLarge { max: max_bytes });
            }
            data.extend_from_slice(&chunk);
        }

        scratch.ensure().await?;
        let file = scratch.adopt(scratch.allocate(&upload_extension(&original_name)));
        tokio::fs::write(file.path(), &data).await?;

        tracing::info!(
            file_name = %original_name,
            path = %file.path().display(),
            bytes = data.len(),
            "Upload persisted"
        );

        return Ok(UploadedFile {
            file,
            original_name,
            declared_mime_type,
            size_bytes: data.len() as u64,
        });
    }

    Err(UploadError::InvalidInput("No file uploaded".to_string()))
}

/// Extension for the persisted upload: the original one when it looks sane
fn upload_extension(original_name: &str) -> String {
    std::path::Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_length_check() {
        let mut headers = HeaderMap::new();
        assert!(check_declared_length(&headers, 1024).is_ok());

        headers.insert(header::CONTENT_LENGTH, (1024 + MULTIPART_OVERHEAD).into());
        assert!(check_declared_length(&headers, 1024).is_ok());

        headers.insert(header::CONTENT_LENGTH, (1025 + MULTIPART_OVERHEAD).into());
        assert!(matches!(
            check_declared_length(&headers, 1024),
            Err(UploadError::PayloadTooLarge { max: 1024 })
        ));

        headers.insert(header::CONTENT_LENGTH, "lots".parse().unwrap());
        assert!(check_declared_length(&headers, 1024).is_ok());
    }

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension("report.pdf"), "pdf");
        assert_eq!(upload_extension("REPORT.PDF"), "pdf");
        assert_eq!(upload_extension("archive.tar.pdf"), "pdf");
        assert_eq!(upload_extension("no_extension"), "pdf");
        assert_eq!(upload_extension("weird.p d f"), "pdf");
        assert_eq!(upload_extension("../../etc/passwd.$(x)"), "pdf");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            UploadError::InvalidInput("Only PDF files are allowed".to_string()).to_string(),
            "Only PDF files are allowed"
        );
        assert_eq!(
            UploadError::PayloadTooLarge { max: 10 }.to_string(),
            "File too large (max: 10 bytes)"
        );
    }
}
