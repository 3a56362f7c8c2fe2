//! Error types for Folio Server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::convert::ConversionError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Message returned for failures whose details stay in the server log
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ErrorResponse {
    pub fn internal() -> Self {
        Self {
            error: INTERNAL_ERROR_MESSAGE.to_string(),
            code: "INTERNAL_ERROR",
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Upload(UploadError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            AppError::Upload(UploadError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status, machine-readable code, and client-safe message
    fn parts(&self) -> (StatusCode, &'static str, String) {
        let status = self.status_code();
        match self {
            AppError::Upload(UploadError::InvalidInput(msg)) => (status, "INVALID_INPUT", msg.clone()),
            AppError::Upload(e @ UploadError::PayloadTooLarge { .. }) => {
                (status, "PAYLOAD_TOO_LARGE", e.to_string())
            }
            AppError::Conversion(ConversionError::Parse(_)) => {
                (status, "PARSE_ERROR", "Failed to parse PDF".to_string())
            }
            AppError::Conversion(ConversionError::Assembly(_)) => {
                (status, "ASSEMBLY_ERROR", "Failed to assemble DOCX".to_string())
            }
            AppError::Conversion(ConversionError::EngineFailed { reason, .. }) => {
                (status, "ENGINE_FAILED", format!("Conversion failed: {}", reason))
            }
            AppError::Upload(UploadError::Storage(_))
            | AppError::Conversion(ConversionError::Io(_))
            | AppError::Conversion(ConversionError::Internal(_))
            | AppError::Internal(_) => (status, "INTERNAL_ERROR", INTERNAL_ERROR_MESSAGE.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        } else {
            tracing::info!(code, error = %self, "Request rejected");
        }

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}
