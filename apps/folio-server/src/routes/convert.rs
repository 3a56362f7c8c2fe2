//! Conversion Routes
//!
//! Endpoints:
//! - POST /convert/pdf-to-word - Upload a PDF (multipart field `file`), receive a DOCX

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::HeaderMap,
    response::Response,
    routing::post,
    Router,
};

use crate::error::Result;
use crate::state::AppState;
use crate::stream;
use crate::upload::{self, UploadError, MULTIPART_OVERHEAD};

/// Create the conversion router
pub fn router(max_upload_bytes: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_bytes.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/pdf-to-word", post(pdf_to_word))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// POST /convert/pdf-to-word
///
/// Receive → persist → convert → stream. Scratch files are released by
/// whichever step ends up owning them last.
async fn pdf_to_word(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let max_upload_bytes = state.config().upload.max_upload_bytes;
    upload::check_declared_length(&headers, max_upload_bytes)?;

    let mut multipart = multipart.map_err(|e| {
        UploadError::InvalidInput(format!("Failed to read upload: {}", e.body_text()))
    })?;

    let upload = upload::receive_pdf(&mut multipart, state.scratch(), max_upload_bytes).await?;

    let artifact = state.converter().convert(upload).await?;

    stream::artifact_response(artifact).await
}
