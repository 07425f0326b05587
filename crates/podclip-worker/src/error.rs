//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Store error: {0}")]
    Store(#[from] podclip_db::DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] podclip_queue::QueueError),

    #[error("Worker pool error: {0}")]
    Pool(String),
}

impl WorkerError {
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }
}
