use core_queue::QueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Sync driver is not running")]
    DriverStopped,
}

pub type Result<T> = std::result::Result<T, SyncError>;
