//! Clip service error types.

use thiserror::Error;

use podclip_media::{FailureKind, MediaError};
use podclip_models::ValidationError;
use podclip_storage::StorageError;

pub type ClipResult<T> = Result<T, ClipError>;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid label: {0}")]
    Label(#[from] podclip_models::SlugError),

    #[error("Clip not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Store error: {0}")]
    Db(#[from] podclip_db::DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] podclip_queue::QueueError),
}

impl ClipError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Canonical `"<type>:<code>: <human>"` message for job and clip rows.
    pub fn failure_message(&self) -> String {
        match self {
            ClipError::Validation(e) => format!("validation:invalid_input: {e}"),
            ClipError::Label(e) => format!("validation:empty_label: {e}"),
            ClipError::NotFound(msg) => format!("validation:not_found: {msg}"),
            ClipError::InvalidState(msg) => format!("validation:invalid_state: {msg}"),
            ClipError::Media(e) => e.classified_message(),
            ClipError::Storage(StorageError::DiskFull { .. }) => {
                format!("system:disk_full: {self}")
            }
            ClipError::Storage(_) => format!("system:storage: {self}"),
            ClipError::Db(_) => format!("system:store_error: {self}"),
            ClipError::Queue(_) => format!("system:queue: {self}"),
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClipError::Validation(_)
            | ClipError::Label(_)
            | ClipError::NotFound(_)
            | ClipError::InvalidState(_) => false,
            ClipError::Media(e) => e.is_retryable(),
            ClipError::Storage(_) | ClipError::Db(_) | ClipError::Queue(_) => true,
        }
    }

    /// Whether the failure should also be written onto the clip row.
    pub fn kind(&self) -> FailureKind {
        match self {
            ClipError::Validation(_)
            | ClipError::Label(_)
            | ClipError::NotFound(_)
            | ClipError::InvalidState(_) => FailureKind::Validation,
            ClipError::Media(e) => e.kind(),
            ClipError::Storage(_) | ClipError::Db(_) | ClipError::Queue(_) => FailureKind::System,
        }
    }
}
