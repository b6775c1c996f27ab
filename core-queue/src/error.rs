use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Invalid upload ID: {0}")]
    InvalidUploadId(String),

    #[error("Failed to encode queue record: {0}")]
    Serialization(String),

    #[error("Blob store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
