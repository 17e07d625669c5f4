//! Error responses for the HTTP gateway
//!
//! Domain errors know nothing about HTTP; the status mapping lives here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::publish::PublishError;
use crate::transcode::TranscodeError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

/// HTTP status for an upload error
pub fn upload_status(err: &UploadError) -> StatusCode {
    match err {
        UploadError::Validation(_) => StatusCode::BAD_REQUEST,
        UploadError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        UploadError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        UploadError::DuplicateSession(_) | UploadError::FinalizeInProgress(_) => StatusCode::CONFLICT,
        UploadError::NegotiationFailed(_)
        | UploadError::ChunkTransfer { .. }
        | UploadError::Finalize(_)
        | UploadError::SubmitFailed(_)
        | UploadError::CoverFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

fn transcode_status(err: &TranscodeError) -> (StatusCode, &'static str) {
    match err {
        TranscodeError::InvalidFilename(_) => (StatusCode::BAD_REQUEST, "INVALID_FILENAME"),
        TranscodeError::UnknownQuality(_) | TranscodeError::UnknownResolution(_) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        }
        TranscodeError::InputNotFound(_) => (StatusCode::NOT_FOUND, "FILE_NOT_FOUND"),
        TranscodeError::Spawn(_) | TranscodeError::Failed { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "TRANSCODE_FAILED")
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = upload_status(&self);
        if status.is_server_error() {
            tracing::warn!(code = self.code(), "Upload request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Upload(e) | AppError::Publish(PublishError::Upload(e)) => {
                return e.into_response();
            }
            AppError::Publish(e) => {
                tracing::error!("Publish error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "PUBLISH_FAILED", e.to_string())
            }
            AppError::Transcode(e) => {
                let (status, code) = transcode_status(&e);
                if status.is_server_error() {
                    tracing::error!("Transcode error: {}", e);
                }
                (status, code, e.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;

    #[test]
    fn test_upload_status_mapping() {
        assert_eq!(
            upload_status(&UploadError::UnsupportedFormat("clip.xyz".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            upload_status(&UploadError::SessionNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            upload_status(&UploadError::ChunkTransfer {
                chunk_index: 0,
                source: RemoteError::Network("reset".into()),
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_publish_wraps_upload_status() {
        let err = AppError::Publish(PublishError::Upload(UploadError::Validation("x".into())));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
