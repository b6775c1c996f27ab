//! # Upload Queue Repository
//!
//! Single source of truth for pending uploads.
//!
//! ## Overview
//!
//! The repository keeps the live set in memory and mirrors every mutation to
//! the blob store before the call returns. All state sits behind one
//! [`RwLock`]; mutations hold the write lock across their persistence call,
//! so a reader never observes a state older than the last resolved mutation
//! and two transitions on the same item cannot interleave.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueRepository::open(Some(store), clock, event_bus).await;
//!
//! let item = queue.enqueue(draft).await?;
//! if let Some(leased) = queue.lease(&item.id).await? {
//!     // submit leased.payload ...
//!     queue.remove(&leased.id).await?;
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::storage::BlobStore;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{QueuedUpload, UploadDraft, UploadFailure, UploadId, UploadStatus};
use crate::persistence::Persistence;

struct QueueState {
    items: HashMap<UploadId, QueuedUpload>,
    /// Highest `created_at_ms` handed out or loaded
    last_created_ms: i64,
    persistence: Persistence,
}

/// The upload queue.
pub struct QueueRepository {
    state: RwLock<QueueState>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl QueueRepository {
    /// Open the queue, restoring whatever `store` holds.
    ///
    /// With `None`, or when the store cannot be used, the queue runs
    /// memory-only; see [`is_durable`](Self::is_durable).
    pub async fn open(
        store: Option<Arc<dyn BlobStore>>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        let (persistence, restored) = Persistence::open(store, event_bus.clone()).await;

        let last_created_ms = restored
            .iter()
            .map(|item| item.created_at_ms)
            .max()
            .unwrap_or(i64::MIN);
        let items: HashMap<_, _> = restored.into_iter().map(|item| (item.id, item)).collect();

        if persistence.is_durable() {
            info!(count = items.len(), "Upload queue restored");
            let _ = event_bus.emit(CoreEvent::Queue(QueueEvent::Restored {
                count: items.len() as u64,
            }));
        }

        Self {
            state: RwLock::new(QueueState {
                items,
                last_created_ms,
                persistence,
            }),
            clock,
            event_bus,
        }
    }

    /// Add a new `Pending` item built from `draft`.
    ///
    /// Content is not validated.
    pub async fn enqueue(&self, draft: UploadDraft) -> Result<QueuedUpload> {
        let mut state = self.state.write().await;

        let now = self.clock.unix_timestamp_millis();
        let created_at_ms = now.max(state.last_created_ms.saturating_add(1));

        let mut id = UploadId::new();
        while state.items.contains_key(&id) {
            id = UploadId::new();
        }

        let item = QueuedUpload {
            id,
            subject: draft.subject,
            note: draft.note,
            coordinate_label: draft.coordinate_label,
            created_at_ms,
            file_name: draft.file_name,
            payload: draft.image.into_bytes(),
            status: UploadStatus::Pending,
        };

        state.persistence.save(&item).await?;
        state.last_created_ms = created_at_ms;
        state.items.insert(item.id, item.clone());

        debug!(
            upload_id = %item.id,
            job_id = %item.subject.job_id,
            payload_bytes = item.payload_len(),
            "Upload enqueued"
        );
        self.emit(QueueEvent::Enqueued {
            upload_id: item.id.to_string(),
            job_id: item.subject.job_id.clone(),
            created_at_ms,
            payload_bytes: item.payload_len(),
        });

        Ok(item)
    }

    /// Delete an item. Returns `false` if it was already gone.
    pub async fn remove(&self, id: &UploadId) -> Result<bool> {
        let mut state = self.state.write().await;

        if state.items.remove(id).is_none() {
            return Ok(false);
        }
        state.persistence.erase(id).await;

        debug!(upload_id = %id, "Upload removed");
        self.emit(QueueEvent::Removed {
            upload_id: id.to_string(),
        });
        Ok(true)
    }

    /// Move an item to `status`. No-op returning `None` if the item is absent.
    pub async fn set_status(
        &self,
        id: &UploadId,
        status: UploadStatus,
    ) -> Result<Option<QueuedUpload>> {
        let mut state = self.state.write().await;
        self.transition(&mut state, id, |_| Some(status)).await
    }

    /// Atomically take the upload lease: `Pending | Error → Uploading`.
    ///
    /// Returns `None` if the item is absent or already leased.
    pub async fn lease(&self, id: &UploadId) -> Result<Option<QueuedUpload>> {
        let mut state = self.state.write().await;
        let leased_at_ms = self.clock.unix_timestamp_millis();

        let Some(current) = state.items.get(id) else {
            return Ok(None);
        };
        if !current.status.is_leasable() {
            return Ok(None);
        }

        self.transition(&mut state, id, |_| {
            Some(UploadStatus::Uploading { leased_at_ms })
        })
        .await
    }

    /// Re-arm a failed item as `Pending`. Other states are left as they are.
    pub async fn retry(&self, id: &UploadId) -> Result<Option<QueuedUpload>> {
        let mut state = self.state.write().await;
        self.transition(&mut state, id, |status| match status {
            UploadStatus::Error { .. } => Some(UploadStatus::Pending),
            _ => None,
        })
        .await
    }

    /// Mark every `Uploading` item as interrupted.
    ///
    /// Only safe when no attempt is in flight, i.e. at the start of a sync
    /// pass. Returns the reclaimed ids in creation order.
    pub async fn reclaim_leases(&self) -> Result<Vec<UploadId>> {
        let mut state = self.state.write().await;

        let mut leased: Vec<_> = state
            .items
            .values()
            .filter(|item| matches!(item.status, UploadStatus::Uploading { .. }))
            .map(|item| (item.created_at_ms, item.id))
            .collect();
        leased.sort();

        let mut reclaimed = Vec::with_capacity(leased.len());
        for (_, id) in leased {
            let updated = self
                .transition(&mut state, &id, |_| {
                    Some(UploadStatus::failed(UploadFailure::interrupted()))
                })
                .await?;
            if updated.is_some() {
                reclaimed.push(id);
            }
        }

        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "Reclaimed interrupted uploads");
        }
        Ok(reclaimed)
    }

    pub async fn get(&self, id: &UploadId) -> Option<QueuedUpload> {
        self.state.read().await.items.get(id).cloned()
    }

    /// Live items, oldest first.
    pub async fn list(&self) -> Vec<QueuedUpload> {
        let state = self.state.read().await;
        let mut items: Vec<_> = state.items.values().cloned().collect();
        items.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.read().await;
        let mut stats = QueueStats::default();

        for item in state.items.values() {
            match &item.status {
                UploadStatus::Pending => stats.pending += 1,
                UploadStatus::Uploading { .. } => stats.uploading += 1,
                UploadStatus::Error { failure } => {
                    stats.failed += 1;
                    if failure.is_retryable() {
                        stats.retryable += 1;
                    }
                }
            }
            stats.total_bytes += item.payload_len();
        }
        stats
    }

    /// Empty the queue and its persisted records. Returns how many items
    /// were dropped.
    pub async fn clear(&self) -> Result<u64> {
        let mut state = self.state.write().await;

        let removed = state.items.len() as u64;
        state.items.clear();
        state.persistence.clear().await;

        info!(removed = removed, "Upload queue cleared");
        self.emit(QueueEvent::Cleared { removed });
        Ok(removed)
    }

    /// Whether mutations currently reach the blob store.
    pub async fn is_durable(&self) -> bool {
        self.state.read().await.persistence.is_durable()
    }

    /// Apply `next` to the item's status and persist the result.
    ///
    /// `next` returning `None` leaves the item untouched.
    async fn transition<F>(
        &self,
        state: &mut QueueState,
        id: &UploadId,
        next: F,
    ) -> Result<Option<QueuedUpload>>
    where
        F: FnOnce(&UploadStatus) -> Option<UploadStatus>,
    {
        let Some(current) = state.items.get(id) else {
            return Ok(None);
        };
        let Some(status) = next(&current.status) else {
            return Ok(Some(current.clone()));
        };

        let mut updated = current.clone();
        updated.status = status;
        state.persistence.save(&updated).await?;
        state.items.insert(*id, updated.clone());

        debug!(
            upload_id = %id,
            status = updated.status.as_str(),
            error = updated.last_error(),
            "Upload status changed"
        );
        self.emit(QueueEvent::StatusChanged {
            upload_id: id.to_string(),
            status: updated.status.as_str().to_string(),
            last_error: updated.last_error().map(str::to_string),
        });

        Ok(Some(updated))
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.event_bus.emit(CoreEvent::Queue(event));
    }
}

/// Snapshot of queue contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub uploading: u64,
    /// Items in `error`, retryable or not
    pub failed: u64,
    /// Failed items the next sync pass will pick up
    pub retryable: u64,
    /// Sum of payload sizes
    pub total_bytes: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.uploading + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
