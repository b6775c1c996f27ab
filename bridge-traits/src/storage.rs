//! Durable Blob Storage Abstraction
//!
//! A key-addressed store whose records carry a structured document plus an
//! optional binary attachment. Each handle is bound to one named collection.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::error::Result;

/// A persisted record.
///
/// The structured part lives in `document`; large binary content goes in
/// `attachment` so it is stored as raw bytes rather than inside the JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub document: Value,
    pub attachment: Option<Bytes>,
}

impl StoredRecord {
    pub fn new(document: Value) -> Self {
        Self {
            document,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Bytes) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Durable key-value store for records with binary payloads.
///
/// Abstracts the host's embedded storage:
/// - Desktop: SQLite (`bridge-desktop::SqliteBlobStore`)
/// - iOS/Android: SQLite or platform object stores
/// - Web: IndexedDB
///
/// # Contract
///
/// - `read` of a missing key is `Ok(None)`, never an error.
/// - `write` replaces the record atomically; if it fails the previous record
///   is still readable.
/// - `erase` of a missing key is a no-op.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{BlobStore, StoredRecord};
///
/// async fn save(store: &dyn BlobStore, jpeg: Bytes) -> Result<()> {
///     let record = StoredRecord::new(serde_json::json!({"file_name": "a.jpg"}))
///         .with_attachment(jpeg);
///     store.write("upload-1", &record).await
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the collection this handle is bound to.
    fn collection(&self) -> &str;

    /// Read the record stored under `key`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn read(&self, key: &str) -> Result<Option<StoredRecord>>;

    /// Insert or replace the record stored under `key`.
    async fn write(&self, key: &str, record: &StoredRecord) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn erase(&self, key: &str) -> Result<()>;

    /// List all keys in the collection.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove every record in the collection.
    async fn clear(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_record_builder() {
        let record = StoredRecord::new(json!({"note": "crack in wall"}))
            .with_attachment(Bytes::from_static(b"\xff\xd8"));

        assert_eq!(record.document["note"], "crack in wall");
        assert_eq!(record.attachment.as_deref(), Some(&b"\xff\xd8"[..]));
    }
}
