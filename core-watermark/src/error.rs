use thiserror::Error;

/// Failures of the watermark stage. Both are terminal for the capture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatermarkError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, WatermarkError>;
