use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine invocation failed: {0}")]
    EngineInvocation(String),

    #[error("Engine timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Parameter table rejected: {0}")]
    SchemaMismatch(String),

    #[error("Failed to clean up temporary file: {0}")]
    ResourceCleanup(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Request body too large: {0}")]
    RequestTooLarge(String),

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            OcrError::EngineUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "ENGINE_UNAVAILABLE"),
            OcrError::EngineInvocation(_) => (StatusCode::BAD_GATEWAY, "ENGINE_ERROR"),
            OcrError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "ENGINE_TIMEOUT"),
            OcrError::MalformedRecord(_) => (StatusCode::BAD_GATEWAY, "MALFORMED_RECORD"),
            OcrError::SchemaMismatch(_) => (StatusCode::UNPROCESSABLE_ENTITY, "SCHEMA_MISMATCH"),
            OcrError::ResourceCleanup(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CLEANUP_ERROR"),
            OcrError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT"),
            OcrError::ImageTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            OcrError::RequestTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            OcrError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            OcrError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            OcrError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
