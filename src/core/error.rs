use serde::Serialize;
use uuid::Uuid;

/// Why a candidate file never entered the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("file size {size} bytes exceeds size limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("file type not supported: {0}")]
    UnsupportedType(String),

    #[error("queue is full: maximum {max} files allowed")]
    QueueFull { max: usize },

    #[error("file name is empty")]
    EmptyName,

    #[error("file could not be read: {0}")]
    Unreadable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("upload not found: {0}")]
    NotFound(Uuid),

    #[error("history store error: {0}")]
    History(String),
}
