//! Best-effort durability for the queue.
//!
//! Wraps an optional [`BlobStore`]. A store that cannot be opened, or whose
//! schema marker is not ours, leaves the queue memory-only for the session.
//! Once open, a failed write or erase is held in a backlog and retried ahead
//! of the next store call, so a transient failure costs durability only
//! until the store answers again. Failures are logged and reported on the
//! event bus; callers never see them as errors.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::storage::{BlobStore, StoredRecord};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{QueueError, Result};
use crate::models::{QueuedUpload, UploadId};

/// Key of the marker record describing the stored layout.
pub const SCHEMA_KEY: &str = "__schema__";

/// Layout version written by this crate.
pub const SCHEMA_VERSION: u64 = 1;

/// Store call that has not reached the store yet.
#[derive(Debug, Clone)]
enum PendingWrite {
    Put(StoredRecord),
    Erase,
}

pub(crate) struct Persistence {
    store: Option<Arc<dyn BlobStore>>,
    /// Latest unwritten change per record key
    backlog: HashMap<String, PendingWrite>,
    /// A `clear` failed and must run before the backlog
    clear_pending: bool,
    /// The last flush stopped on a store error
    failing: bool,
    event_bus: EventBus,
}

impl Persistence {
    /// Check the schema marker and load every decodable item.
    pub(crate) async fn open(
        store: Option<Arc<dyn BlobStore>>,
        event_bus: EventBus,
    ) -> (Self, Vec<QueuedUpload>) {
        let mut persistence = Self {
            store: None,
            backlog: HashMap::new(),
            clear_pending: false,
            failing: false,
            event_bus,
        };

        let Some(store) = store else {
            persistence.detach("no blob store configured".to_string());
            return (persistence, Vec::new());
        };

        if let Err(reason) = check_schema(store.as_ref()).await {
            persistence.detach(reason);
            return (persistence, Vec::new());
        }

        match load_all(store.as_ref()).await {
            Ok(items) => {
                persistence.store = Some(store);
                (persistence, items)
            }
            Err(reason) => {
                persistence.detach(reason);
                (persistence, Vec::new())
            }
        }
    }

    /// Attached to a store with nothing waiting to be written.
    pub(crate) fn is_durable(&self) -> bool {
        self.store.is_some() && self.backlog.is_empty() && !self.clear_pending
    }

    pub(crate) async fn save(&mut self, item: &QueuedUpload) -> Result<()> {
        let record = encode(item)?;
        if self.store.is_none() {
            return Ok(());
        }

        self.backlog.insert(item.id.to_string(), PendingWrite::Put(record));
        self.flush().await;
        Ok(())
    }

    pub(crate) async fn erase(&mut self, id: &UploadId) {
        if self.store.is_none() {
            return;
        }

        self.backlog.insert(id.to_string(), PendingWrite::Erase);
        self.flush().await;
    }

    /// Remove every upload record, keeping the schema marker.
    pub(crate) async fn clear(&mut self) {
        if self.store.is_none() {
            return;
        }

        self.backlog.clear();
        self.clear_pending = true;
        self.flush().await;
    }

    /// Write the backlog through, stopping at the first failure.
    async fn flush(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };

        if self.clear_pending {
            let result = match store.clear().await {
                Ok(()) => write_marker(store.as_ref()).await,
                Err(e) => Err(e.to_string()),
            };
            if let Err(reason) = result {
                self.report(format!("clear failed: {}", reason));
                return;
            }
            self.clear_pending = false;
        }

        let keys: Vec<String> = self.backlog.keys().cloned().collect();
        let mut flushed = 0u64;
        for key in keys {
            let Some(pending) = self.backlog.get(&key) else {
                continue;
            };
            let (action, result) = match pending {
                PendingWrite::Put(record) => ("write", store.write(&key, record).await),
                PendingWrite::Erase => ("erase", store.erase(&key).await),
            };
            if let Err(e) = result {
                self.report(format!("{} of {} failed: {}", action, key, e));
                return;
            }
            self.backlog.remove(&key);
            flushed += 1;
        }

        if std::mem::take(&mut self.failing) {
            info!(flushed = flushed, "Upload queue persistence caught up");
            let _ = self
                .event_bus
                .emit(CoreEvent::Queue(QueueEvent::PersistenceRecovered { flushed }));
        }
    }

    /// A store call failed; the backlog keeps the change for the next flush.
    fn report(&mut self, reason: String) {
        self.failing = true;
        let error = QueueError::StoreUnavailable(reason.clone());
        warn!(
            error = %error,
            backlog = self.backlog.len(),
            "Upload queue change kept in memory until the store recovers"
        );
        let _ = self
            .event_bus
            .emit(CoreEvent::Queue(QueueEvent::PersistenceDegraded { reason }));
    }

    /// The store could not be opened; run memory-only for the session.
    fn detach(&mut self, reason: String) {
        let error = QueueError::StoreUnavailable(reason.clone());
        warn!(error = %error, "Upload queue continuing without persistence");
        self.store = None;
        let _ = self
            .event_bus
            .emit(CoreEvent::Queue(QueueEvent::PersistenceDegraded { reason }));
    }
}

async fn load_all(store: &dyn BlobStore) -> std::result::Result<Vec<QueuedUpload>, String> {
    let keys = store
        .keys()
        .await
        .map_err(|e| format!("listing records failed: {}", e))?;

    let mut items = Vec::with_capacity(keys.len());
    for key in keys.iter().filter(|k| k.as_str() != SCHEMA_KEY) {
        let record = store
            .read(key)
            .await
            .map_err(|e| format!("reading {} failed: {}", key, e))?;
        let Some(record) = record else {
            continue;
        };
        match decode(key, record) {
            Ok(item) => items.push(item),
            Err(reason) => {
                warn!(key = %key, error = %reason, "Skipping undecodable queue record");
            }
        }
    }

    info!(
        collection = store.collection(),
        count = items.len(),
        "Loaded persisted uploads"
    );
    Ok(items)
}

async fn check_schema(store: &dyn BlobStore) -> std::result::Result<(), String> {
    let marker = store
        .read(SCHEMA_KEY)
        .await
        .map_err(|e| format!("reading schema marker failed: {}", e))?;

    let Some(marker) = marker else {
        debug!(collection = store.collection(), "Writing schema marker");
        return write_marker(store).await;
    };

    match marker.document.get("schema_version").and_then(|v| v.as_u64()) {
        Some(version) if version <= SCHEMA_VERSION => Ok(()),
        Some(version) => Err(format!(
            "stored schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )),
        None => Err(format!(
            "unrecognised schema marker in collection {}",
            store.collection()
        )),
    }
}

async fn write_marker(store: &dyn BlobStore) -> std::result::Result<(), String> {
    let record = StoredRecord::new(json!({ "schema_version": SCHEMA_VERSION }));
    store
        .write(SCHEMA_KEY, &record)
        .await
        .map_err(|e| format!("writing schema marker failed: {}", e))
}

fn encode(item: &QueuedUpload) -> Result<StoredRecord> {
    let document =
        serde_json::to_value(item).map_err(|e| QueueError::Serialization(e.to_string()))?;
    Ok(StoredRecord::new(document).with_attachment(item.payload.clone()))
}

fn decode(key: &str, record: StoredRecord) -> std::result::Result<QueuedUpload, String> {
    let mut item: QueuedUpload =
        serde_json::from_value(record.document).map_err(|e| e.to_string())?;

    if item.id.to_string() != key {
        return Err(format!("record id {} does not match its key", item.id));
    }

    item.payload = record
        .attachment
        .ok_or_else(|| "record has no payload attachment".to_string())?;
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubjectRefs, UploadStatus};
    use bytes::Bytes;

    fn item() -> QueuedUpload {
        QueuedUpload {
            id: UploadId::new(),
            subject: SubjectRefs::new("JOB-1").with_recipient("R-9"),
            note: "meter photo".to_string(),
            coordinate_label: "-6.81,107.14".to_string(),
            created_at_ms: 1_700_000_000_000,
            file_name: "meter.jpg".to_string(),
            payload: Bytes::from_static(b"\xff\xd8\xff\xd9"),
            status: UploadStatus::Pending,
        }
    }

    #[test]
    fn test_payload_travels_as_attachment() {
        let item = item();
        let record = encode(&item).unwrap();

        assert!(record.document.get("payload").is_none());
        assert_eq!(record.attachment.as_ref(), Some(&item.payload));

        let decoded = decode(&item.id.to_string(), record).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_decode_rejects_mismatched_key() {
        let item = item();
        let record = encode(&item).unwrap();
        assert!(decode(&UploadId::new().to_string(), record).is_err());
    }

    #[test]
    fn test_decode_requires_attachment() {
        let item = item();
        let record = StoredRecord::new(serde_json::to_value(&item).unwrap());
        assert!(decode(&item.id.to_string(), record).is_err());
    }
}
