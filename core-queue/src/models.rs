//! # Upload Queue Domain Models
//!
//! The unit of work is a [`QueuedUpload`]: a watermarked photo, the subject
//! it is evidence for, and its delivery status.
//!
//! ## Status lifecycle
//!
//! ```text
//! Pending ──lease──▶ Uploading ──failure──▶ Error
//!    ▲                    │                   │
//!    └──────retry─────────┼───────────────────┘
//!                         └──success──▶ (removed)
//! ```
//!
//! There is no terminal success status: a delivered item leaves the queue.

use bytes::Bytes;
use core_watermark::WatermarkedImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{QueueError, Result};

/// Type-safe upload identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Create a new random upload ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an upload ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| QueueError::InvalidUploadId(format!("{}: {}", s, e)))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an upload is evidence for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRefs {
    pub job_id: String,
    pub component_id: Option<String>,
    pub recipient_id: Option<String>,
}

impl SubjectRefs {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            component_id: None,
            recipient_id: None,
        }
    }

    pub fn with_component(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }

    pub fn with_recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }
}

/// Everything needed to enqueue an upload.
///
/// The payload is a [`WatermarkedImage`], so a raw capture cannot be queued.
#[derive(Debug, Clone)]
pub struct UploadDraft {
    pub subject: SubjectRefs,
    pub note: String,
    pub coordinate_label: String,
    pub file_name: String,
    pub image: WatermarkedImage,
}

impl UploadDraft {
    pub fn new(
        subject: SubjectRefs,
        note: impl Into<String>,
        coordinate_label: impl Into<String>,
        file_name: impl Into<String>,
        image: WatermarkedImage,
    ) -> Self {
        Self {
            subject,
            note: note.into(),
            coordinate_label: coordinate_label.into(),
            file_name: file_name.into(),
            image,
        }
    }
}

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connectivity or transport failure (including timeouts)
    Network,
    /// The server refused the request (4xx); needs user action
    ServerRejected,
    /// The server failed temporarily (5xx, 408, 425, 429)
    ServerTransient,
    /// The process stopped while the item was uploading
    Interrupted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::ServerRejected => "server_rejected",
            Self::ServerTransient => "server_transient",
            Self::Interrupted => "interrupted",
        }
    }

    /// Whether the next sync pass picks the item up on its own.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ServerRejected)
    }
}

/// A recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub kind: FailureKind,
    pub message: String,
    pub http_status: Option<u16>,
}

impl UploadFailure {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Network,
            message: message.into(),
            http_status: None,
        }
    }

    pub fn rejected(http_status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ServerRejected,
            message: message.into(),
            http_status: Some(http_status),
        }
    }

    pub fn transient(http_status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ServerTransient,
            message: message.into(),
            http_status: Some(http_status),
        }
    }

    pub fn interrupted() -> Self {
        Self {
            kind: FailureKind::Interrupted,
            message: "upload interrupted before a response was received".to_string(),
            http_status: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Delivery status of a live item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    /// Leased by a sync pass
    Uploading { leased_at_ms: i64 },
    Error { failure: UploadFailure },
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading { .. } => "uploading",
            Self::Error { .. } => "error",
        }
    }

    pub fn failed(failure: UploadFailure) -> Self {
        Self::Error { failure }
    }

    /// Pending, or failed with a retryable kind.
    pub fn is_sync_eligible(&self) -> bool {
        match self {
            Self::Pending => true,
            Self::Uploading { .. } => false,
            Self::Error { failure } => failure.is_retryable(),
        }
    }

    /// Whether a lease may be taken from this status.
    pub fn is_leasable(&self) -> bool {
        !matches!(self, Self::Uploading { .. })
    }
}

/// An item in the upload queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedUpload {
    pub id: UploadId,
    pub subject: SubjectRefs,
    pub note: String,
    pub coordinate_label: String,
    /// Creation time (Unix epoch milliseconds), strictly increasing per queue
    pub created_at_ms: i64,
    pub file_name: String,
    /// Watermarked JPEG; stored as the record attachment, not in the document
    #[serde(skip)]
    pub payload: Bytes,
    pub status: UploadStatus,
}

impl QueuedUpload {
    /// Failure message, present only in the `Error` status.
    pub fn last_error(&self) -> Option<&str> {
        match &self.status {
            UploadStatus::Error { failure } => Some(failure.message.as_str()),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&UploadFailure> {
        match &self.status {
            UploadStatus::Error { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }
}
