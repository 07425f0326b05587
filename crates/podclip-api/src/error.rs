//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use podclip_clips::ClipError;
use podclip_media::MediaError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        match &e {
            MediaError::SsrfBlocked { .. } => {
                // Fixed client-facing text; the resolved address stays in logs.
                ApiError::Forbidden("Access to private networks is not allowed".to_string())
            }
            MediaError::InvalidUrl(_) | MediaError::UrlTooLong | MediaError::InvalidInterval(_) => {
                ApiError::BadRequest(e.to_string())
            }
            MediaError::UpstreamStatus { .. }
            | MediaError::HtmlBody
            | MediaError::RedirectLoop
            | MediaError::DownloadFailed { .. }
            | MediaError::Http(_) => ApiError::BadGateway(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ClipError> for ApiError {
    fn from(e: ClipError) -> Self {
        match e {
            ClipError::Validation(e) => ApiError::BadRequest(e.to_string()),
            ClipError::Label(e) => ApiError::BadRequest(e.to_string()),
            ClipError::NotFound(msg) => ApiError::NotFound(msg),
            ClipError::InvalidState(msg) => ApiError::Conflict(msg),
            ClipError::Media(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<podclip_db::DbError> for ApiError {
    fn from(e: podclip_db::DbError) -> Self {
        match e {
            podclip_db::DbError::NotFound(msg) => ApiError::NotFound(msg),
            podclip_db::DbError::InvalidState(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<podclip_queue::QueueError> for ApiError {
    fn from(e: podclip_queue::QueueError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<podclip_storage::StorageError> for ApiError {
    fn from(e: podclip_storage::StorageError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 5xx bodies carry a short detail, never internal specifics.
        let detail = match &self {
            ApiError::Internal(_) => "An internal error occurred".to_string(),
            ApiError::BadGateway(_) => "Upstream audio source failed".to_string(),
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
