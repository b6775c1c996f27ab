use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capture is not permitted for the current user")]
    CaptureNotPermitted,

    #[error("Upload {0} not found")]
    UploadNotFound(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Watermark error: {0}")]
    Watermark(#[from] core_watermark::WatermarkError),

    #[error("Queue error: {0}")]
    Queue(#[from] core_queue::QueueError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
