//! Integration tests for the upload queue against real and failing blob stores

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_desktop::SqliteBlobStore;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::{BlobStore, StoredRecord};
use bridge_traits::time::SystemClock;
use core_queue::{
    FailureKind, QueueRepository, SubjectRefs, UploadDraft, UploadFailure, UploadId, UploadStatus,
    SCHEMA_KEY,
};
use core_runtime::events::{CoreEvent, EventBus, QueueEvent};
use core_watermark::{apply_watermark, WatermarkLabel, WatermarkOptions, WatermarkedImage};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;

const COLLECTION: &str = "evidence-upload-queue";

fn watermarked() -> WatermarkedImage {
    let mut png = Vec::new();
    RgbImage::from_pixel(64, 48, Rgb([40, 160, 90]))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    apply_watermark(
        &png,
        &WatermarkLabel::new("2024-01-15 08:00:00", "-6.810000,107.140000"),
        &WatermarkOptions::default(),
    )
    .unwrap()
}

fn draft(job: &str) -> UploadDraft {
    UploadDraft::new(
        SubjectRefs::new(job).with_component("PANEL-2"),
        "cracked housing",
        "-6.81,107.14",
        format!("{}.jpg", job),
        watermarked(),
    )
}

fn temp_db() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("evidence-queue-{}.db", uuid::Uuid::new_v4()))
}

async fn open_queue(store: Arc<dyn BlobStore>) -> QueueRepository {
    QueueRepository::open(Some(store), Arc::new(SystemClock), EventBus::new(64)).await
}

async fn sqlite_queue() -> QueueRepository {
    let store = SqliteBlobStore::in_memory(COLLECTION).await.unwrap();
    open_queue(Arc::new(store)).await
}

/// Store whose every operation fails.
struct BrokenStore;

#[async_trait]
impl BlobStore for BrokenStore {
    fn collection(&self) -> &str {
        COLLECTION
    }

    async fn read(&self, _key: &str) -> BridgeResult<Option<StoredRecord>> {
        Err(BridgeError::NotAvailable("storage disabled".to_string()))
    }

    async fn write(&self, _key: &str, _record: &StoredRecord) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("storage disabled".to_string()))
    }

    async fn erase(&self, _key: &str) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("storage disabled".to_string()))
    }

    async fn keys(&self) -> BridgeResult<Vec<String>> {
        Err(BridgeError::NotAvailable("storage disabled".to_string()))
    }

    async fn clear(&self) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("storage disabled".to_string()))
    }
}

/// SQLite store whose next few upload-record calls fail, then recover.
struct FlakyStore {
    inner: SqliteBlobStore,
    failing_writes: AtomicUsize,
    failing_erases: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: SqliteBlobStore, failing_writes: usize, failing_erases: usize) -> Self {
        Self {
            inner,
            failing_writes: AtomicUsize::new(failing_writes),
            failing_erases: AtomicUsize::new(failing_erases),
        }
    }

    fn take_failure(counter: &AtomicUsize, key: &str) -> bool {
        key != SCHEMA_KEY
            && counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    fn collection(&self) -> &str {
        self.inner.collection()
    }

    async fn read(&self, key: &str) -> BridgeResult<Option<StoredRecord>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, record: &StoredRecord) -> BridgeResult<()> {
        if Self::take_failure(&self.failing_writes, key) {
            return Err(BridgeError::Storage("database is locked".to_string()));
        }
        self.inner.write(key, record).await
    }

    async fn erase(&self, key: &str) -> BridgeResult<()> {
        if Self::take_failure(&self.failing_erases, key) {
            return Err(BridgeError::Storage("database is locked".to_string()));
        }
        self.inner.erase(key).await
    }

    async fn keys(&self) -> BridgeResult<Vec<String>> {
        self.inner.keys().await
    }

    async fn clear(&self) -> BridgeResult<()> {
        self.inner.clear().await
    }
}

fn queue_events(events: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<QueueEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Queue(event) = event {
            collected.push(event);
        }
    }
    collected
}

#[tokio::test]
async fn test_enqueue_then_list() {
    let queue = sqlite_queue().await;
    let draft = draft("JOB-1");
    let payload = draft.image.bytes().clone();

    let item = queue.enqueue(draft).await.unwrap();
    let listed = queue.list().await;

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, item.id);
    assert_eq!(listed[0].status, UploadStatus::Pending);
    assert_eq!(listed[0].last_error(), None);
    assert_eq!(listed[0].payload, payload);
    assert_eq!(listed[0].subject.component_id.as_deref(), Some("PANEL-2"));
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let queue = sqlite_queue().await;
    let item = queue.enqueue(draft("JOB-1")).await.unwrap();

    assert!(queue.remove(&item.id).await.unwrap());
    assert!(!queue.remove(&item.id).await.unwrap());
    assert!(queue.list().await.is_empty());
    assert!(queue.get(&item.id).await.is_none());
}

#[tokio::test]
async fn test_set_status_on_absent_id_is_noop() {
    let queue = sqlite_queue().await;
    let result = queue
        .set_status(&UploadId::new(), UploadStatus::Pending)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_status_transitions_preserve_fields() {
    let queue = sqlite_queue().await;
    let item = queue.enqueue(draft("JOB-7")).await.unwrap();

    let leased = queue.lease(&item.id).await.unwrap().unwrap();
    assert_eq!(leased.status.as_str(), "uploading");

    let failed = queue
        .set_status(
            &item.id,
            UploadStatus::failed(UploadFailure::transient(500, "HTTP 500: internal error")),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(failed.last_error(), Some("HTTP 500: internal error"));
    assert_eq!(failed.id, item.id);
    assert_eq!(failed.subject, item.subject);
    assert_eq!(failed.note, item.note);
    assert_eq!(failed.coordinate_label, item.coordinate_label);
    assert_eq!(failed.created_at_ms, item.created_at_ms);
    assert_eq!(failed.file_name, item.file_name);
    assert_eq!(failed.payload, item.payload);

    let pending = queue
        .set_status(&item.id, UploadStatus::Pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.last_error(), None);

    assert!(queue.remove(&item.id).await.unwrap());
    assert!(queue.list().await.is_empty());
}

#[tokio::test]
async fn test_reload_from_fresh_store_handle() {
    let path = temp_db();

    let (first, second) = {
        let store = SqliteBlobStore::open(&path, COLLECTION).await.unwrap();
        let queue = open_queue(Arc::new(store)).await;
        assert!(queue.is_durable().await);

        let first = queue.enqueue(draft("JOB-1")).await.unwrap();
        let second = queue.enqueue(draft("JOB-2")).await.unwrap();
        queue
            .set_status(
                &second.id,
                UploadStatus::failed(UploadFailure::rejected(422, "unknown job")),
            )
            .await
            .unwrap();
        (first, second)
    };

    let store = SqliteBlobStore::open(&path, COLLECTION).await.unwrap();
    let reopened = open_queue(Arc::new(store)).await;
    let items = reopened.list().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, first.id);
    assert_eq!(items[0].payload, first.payload);
    assert_eq!(items[0].status, UploadStatus::Pending);
    assert_eq!(items[1].id, second.id);
    assert_eq!(
        items[1].failure().map(|f| (f.kind, f.http_status)),
        Some((FailureKind::ServerRejected, Some(422)))
    );

    // New items keep sorting after restored ones
    let third = reopened.enqueue(draft("JOB-3")).await.unwrap();
    assert!(third.created_at_ms > second.created_at_ms);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_clear_empties_store_but_keeps_marker() {
    let store = SqliteBlobStore::in_memory(COLLECTION).await.unwrap();
    let queue = open_queue(Arc::new(store.clone())).await;
    queue.enqueue(draft("JOB-1")).await.unwrap();
    queue.enqueue(draft("JOB-2")).await.unwrap();

    assert_eq!(queue.clear().await.unwrap(), 2);
    assert!(queue.list().await.is_empty());
    assert_eq!(store.keys().await.unwrap(), vec![SCHEMA_KEY.to_string()]);
    assert!(queue.is_durable().await);
}

#[tokio::test]
async fn test_broken_store_degrades_to_memory() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let queue =
        QueueRepository::open(Some(Arc::new(BrokenStore)), Arc::new(SystemClock), bus).await;

    assert!(!queue.is_durable().await);
    match events.try_recv().unwrap() {
        CoreEvent::Queue(QueueEvent::PersistenceDegraded { reason }) => {
            assert!(reason.contains("schema marker"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let item = queue.enqueue(draft("JOB-1")).await.unwrap();
    assert!(queue.lease(&item.id).await.unwrap().is_some());
    assert!(queue.remove(&item.id).await.unwrap());
}

#[tokio::test]
async fn test_failed_write_is_retried_after_store_recovers() {
    let sqlite = SqliteBlobStore::in_memory(COLLECTION).await.unwrap();
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let queue = QueueRepository::open(
        Some(Arc::new(FlakyStore::new(sqlite.clone(), 1, 0))),
        Arc::new(SystemClock),
        bus,
    )
    .await;
    assert!(queue.is_durable().await);

    let a = queue.enqueue(draft("JOB-A")).await.unwrap();
    assert!(!queue.is_durable().await);
    let b = queue.enqueue(draft("JOB-B")).await.unwrap();
    let c = queue.enqueue(draft("JOB-C")).await.unwrap();
    assert!(queue.is_durable().await);

    let seen = queue_events(&mut events);
    assert!(seen.iter().any(|e| matches!(
        e,
        QueueEvent::PersistenceDegraded { reason } if reason.contains(&a.id.to_string())
    )));
    assert!(seen
        .iter()
        .any(|e| matches!(e, QueueEvent::PersistenceRecovered { flushed: 2 })));

    let reopened = open_queue(Arc::new(sqlite)).await;
    let restored: HashSet<UploadId> = reopened.list().await.into_iter().map(|i| i.id).collect();
    assert_eq!(restored, HashSet::from([a.id, b.id, c.id]));
    assert!(reopened.is_durable().await);
}

#[tokio::test]
async fn test_store_outage_spanning_several_calls() {
    let sqlite = SqliteBlobStore::in_memory(COLLECTION).await.unwrap();
    let queue = open_queue(Arc::new(FlakyStore::new(sqlite.clone(), 3, 1))).await;

    let a = queue.enqueue(draft("JOB-A")).await.unwrap();
    let b = queue.enqueue(draft("JOB-B")).await.unwrap();
    queue.lease(&a.id).await.unwrap();
    assert!(!queue.is_durable().await);

    // Delivered while the store is still refusing erases
    assert!(queue.remove(&a.id).await.unwrap());
    assert!(!queue.is_durable().await);

    let c = queue.enqueue(draft("JOB-C")).await.unwrap();
    assert!(queue.is_durable().await);

    let reopened = open_queue(Arc::new(sqlite)).await;
    let restored: HashSet<UploadId> = reopened.list().await.into_iter().map(|i| i.id).collect();
    assert_eq!(restored, HashSet::from([b.id, c.id]));
    assert_eq!(reopened.get(&b.id).await.unwrap().status, UploadStatus::Pending);
}

#[tokio::test]
async fn test_newer_schema_leaves_data_untouched() {
    let store = SqliteBlobStore::in_memory(COLLECTION).await.unwrap();
    let future = StoredRecord::new(json!({ "schema_version": 2 }));
    let foreign = StoredRecord::new(json!({ "layout": "v2" }));
    store.write(SCHEMA_KEY, &future).await.unwrap();
    store.write("some-v2-record", &foreign).await.unwrap();

    let queue = open_queue(Arc::new(store.clone())).await;
    assert!(!queue.is_durable().await);
    assert!(queue.list().await.is_empty());

    queue.enqueue(draft("JOB-1")).await.unwrap();
    queue.clear().await.unwrap();

    assert_eq!(store.read(SCHEMA_KEY).await.unwrap(), Some(future));
    assert_eq!(store.read("some-v2-record").await.unwrap(), Some(foreign));
    assert_eq!(store.keys().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_undecodable_records_are_skipped() {
    let store = SqliteBlobStore::in_memory(COLLECTION).await.unwrap();
    {
        let queue = open_queue(Arc::new(store.clone())).await;
        queue.enqueue(draft("JOB-1")).await.unwrap();
    }
    store
        .write("garbage", &StoredRecord::new(json!({ "id": 42 })))
        .await
        .unwrap();

    let queue = open_queue(Arc::new(store.clone())).await;
    assert_eq!(queue.list().await.len(), 1);
    assert!(queue.is_durable().await);
    assert!(store.read("garbage").await.unwrap().is_some());
}

#[tokio::test]
async fn test_ten_thousand_unique_ids_under_concurrency() {
    let queue = Arc::new(
        QueueRepository::open(None, Arc::new(SystemClock), EventBus::new(16)).await,
    );
    let template = draft("JOB-BULK");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let queue = queue.clone();
        let template = template.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::with_capacity(1250);
            for _ in 0..1250 {
                ids.push(queue.enqueue(template.clone()).await.unwrap().id);
            }
            ids
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "duplicate id {}", id);
        }
    }
    assert_eq!(seen.len(), 10_000);

    let listed = queue.list().await;
    assert_eq!(listed.len(), 10_000);
    assert!(listed
        .windows(2)
        .all(|pair| pair[0].created_at_ms < pair[1].created_at_ms));
}
