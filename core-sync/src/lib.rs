//! # Upload Sync Module
//!
//! Drains the upload queue against the remote evidence API.
//!
//! ## Components
//!
//! - **Request** (`request`): multipart request building, dedup token, response classification
//! - **Sync Engine** (`engine`): exclusive passes with bounded fan-out and failure isolation
//! - **Sync Driver** (`driver`): background loop turning timers, connectivity changes and
//!   explicit requests into passes
//!
//! ## Delivery guarantees
//!
//! - An item is attempted at most once per pass, in creation order
//! - The `uploading` status is a lease: one in-flight submission per item
//! - Every attempt for an item carries the same `Idempotency-Key`, so the
//!   server can discard a resubmission after a crash
//! - Rejected (4xx) items wait for an explicit retry; everything else is
//!   picked up again by the next pass

pub mod driver;
pub mod engine;
pub mod error;
pub mod request;

pub use driver::{DriverConfig, SyncDriver, SyncHandle, SyncTrigger};
pub use engine::{OutcomeStatus, SyncConfig, SyncEngine, SyncReport, UploadOutcome};
pub use error::{Result, SyncError};
pub use request::{build_request, classify_error, classify_response, dedup_token};
