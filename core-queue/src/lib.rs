//! # Upload Queue Module
//!
//! Crash-durable queue of watermarked evidence uploads.
//!
//! ## Overview
//!
//! - **Models** (`models`): upload ids, subject references, the status state machine
//! - **Repository** (`repository`): the live set, atomic transitions, FIFO listing
//! - **Persistence** (`persistence`): best-effort mirroring into a [`BlobStore`]
//!
//! Durability is best-effort. When the blob store is missing or cannot be
//! opened, the queue keeps working from memory for the rest of the session.
//! A store call that fails later is retried ahead of the next one. Both cases
//! are reported with `QueueEvent::PersistenceDegraded`, and a caught-up
//! backlog with `QueueEvent::PersistenceRecovered`.
//!
//! [`BlobStore`]: bridge_traits::storage::BlobStore

pub mod error;
pub mod models;
pub mod persistence;
pub mod repository;

pub use error::{QueueError, Result};
pub use models::{
    FailureKind, QueuedUpload, SubjectRefs, UploadDraft, UploadFailure, UploadId, UploadStatus,
};
pub use persistence::{SCHEMA_KEY, SCHEMA_VERSION};
pub use repository::{QueueRepository, QueueStats};
