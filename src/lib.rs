//! Workspace entry crate.
//!
//! Re-exports the evidence core façade so host applications can depend on
//! `evidence-queue` alone and pick the bridge wiring through features
//! (`desktop-shims` pulls in the reqwest HTTP client and the SQLite store).

#[cfg(feature = "desktop-shims")]
pub use core_service::{
    CaptureDraft, CaptureService, CaptureSession, CoreError, EvidenceCore, Result,
};
