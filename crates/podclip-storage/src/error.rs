//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid label: {0}")]
    InvalidLabel(#[from] podclip_models::SlugError),

    #[error("Insufficient disk space under {path} ({available} bytes available)")]
    DiskFull { path: PathBuf, available: u64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
