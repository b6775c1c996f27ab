//! End-to-end tests for the evidence core façade

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_desktop::SqliteBlobStore;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::gate::CapabilityGate;
use bridge_traits::http::{HttpBody, HttpClient, HttpRequest, HttpResponse, MultipartField};
use bridge_traits::AllowAll;
use bytes::Bytes;
use chrono::{FixedOffset, TimeZone};
use core_queue::{SubjectRefs, UploadId, UploadStatus};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CaptureEvent, CoreEvent};
use core_service::{CaptureDraft, CoreError, EvidenceCore};
use core_watermark::{GeoPoint, WatermarkError, WatermarkLabel};
use image::{ImageFormat, Rgb, RgbImage};
use mockall::mock;

mock! {
    pub Gate {}

    impl CapabilityGate for Gate {
        fn can_capture(&self) -> bool;
    }
}

/// Accepts every upload and keeps the photo parts it received.
#[derive(Default)]
struct RecordingHttpClient {
    photos: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingHttpClient {
    fn photos(&self) -> Vec<(String, Bytes)> {
        self.photos.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        if let Some(HttpBody::Multipart(fields)) = &request.body {
            for field in fields {
                if let MultipartField::File {
                    file_name, data, ..
                } = field
                {
                    self.photos
                        .lock()
                        .unwrap()
                        .push((file_name.clone(), data.clone()));
                }
            }
        }
        Ok(HttpResponse::new(201))
    }
}

fn png(width: u32, height: u32) -> Bytes {
    let mut out = Vec::new();
    RgbImage::from_pixel(width, height, Rgb([90, 120, 150]))
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    Bytes::from(out)
}

fn label() -> WatermarkLabel {
    let taken_at = FixedOffset::east_opt(7 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 15, 10, 30, 0)
        .unwrap();
    WatermarkLabel::for_capture(&taken_at, GeoPoint::new(-6.81, 107.14).unwrap())
}

async fn core_with(
    gate: Arc<dyn CapabilityGate>,
    client: Arc<RecordingHttpClient>,
) -> EvidenceCore {
    let store = SqliteBlobStore::in_memory("uploads").await.unwrap();
    let config = CoreConfig::builder()
        .upload_endpoint("https://api.example.com/evidence")
        .blob_store(Arc::new(store))
        .http_client(client)
        .capability_gate(gate)
        .build()
        .unwrap();
    EvidenceCore::bootstrap(config).await.unwrap()
}

#[tokio::test]
async fn test_denied_gate_refuses_capture() {
    let mut gate = MockGate::new();
    gate.expect_can_capture().times(1).return_const(false);

    let core = core_with(Arc::new(gate), Arc::new(RecordingHttpClient::default())).await;
    let mut events = core
        .subscribe()
        .filter(|e| matches!(e, CoreEvent::Capture(_)));

    let result = core.capture_session();
    assert!(matches!(result, Err(CoreError::CaptureNotPermitted)));

    let event = events.try_recv().unwrap().unwrap();
    assert!(matches!(event, CoreEvent::Capture(CaptureEvent::Denied)));
    assert!(core.list().await.is_empty());
}

#[tokio::test]
async fn test_gate_checked_once_per_session() {
    let mut gate = MockGate::new();
    gate.expect_can_capture().times(1).return_const(true);

    let core = core_with(Arc::new(gate), Arc::new(RecordingHttpClient::default())).await;
    let session = core.capture_session().unwrap();

    for job in ["JOB-1", "JOB-2"] {
        session
            .submit(png(64, 48), label(), CaptureDraft::new(SubjectRefs::new(job), ""))
            .await
            .unwrap();
    }

    assert_eq!(core.stats().await.pending, 2);
}

#[tokio::test]
async fn test_undecodable_capture_is_not_queued() {
    let core = core_with(Arc::new(AllowAll), Arc::new(RecordingHttpClient::default())).await;
    let mut events = core
        .subscribe()
        .filter(|e| matches!(e, CoreEvent::Capture(_)));
    let session = core.capture_session().unwrap();

    let result = session
        .submit(
            Bytes::from_static(b"definitely not an image"),
            label(),
            CaptureDraft::new(SubjectRefs::new("JOB-1"), "meter"),
        )
        .await;

    assert!(matches!(
        result,
        Err(CoreError::Watermark(WatermarkError::Decode(_)))
    ));
    assert!(matches!(
        events.try_recv().unwrap().unwrap(),
        CoreEvent::Capture(CaptureEvent::WatermarkFailed { .. })
    ));
    assert!(core.list().await.is_empty());
}

#[tokio::test]
async fn test_capture_to_delivery() {
    let client = Arc::new(RecordingHttpClient::default());
    let core = core_with(Arc::new(AllowAll), client.clone()).await;
    assert!(core.is_durable().await);

    let session = core.capture_session().unwrap();
    let draft = CaptureDraft::new(
        SubjectRefs::new("JOB-7").with_component("PUMP-2"),
        "seal replaced",
    )
    .with_file_name("pump.jpg");
    let queued = session.submit(png(400, 300), label(), draft).await.unwrap();

    assert_eq!(queued.status, UploadStatus::Pending);
    assert_eq!(queued.coordinate_label, "-6.810000,107.140000");
    assert_eq!(queued.subject.component_id.as_deref(), Some("PUMP-2"));

    let report = core.sync_now().await;
    assert_eq!(report.delivered, 1);
    assert!(core.get(&queued.id).await.is_none());

    let photos = client.photos();
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].0, "pump.jpg");

    let delivered = image::load_from_memory(&photos[0].1).unwrap();
    assert_eq!((delivered.width(), delivered.height()), (400, 300));
}

#[tokio::test]
async fn test_default_file_name() {
    let core = core_with(Arc::new(AllowAll), Arc::new(RecordingHttpClient::default())).await;
    let session = core.capture_session().unwrap();

    let queued = session
        .submit(png(32, 32), label(), CaptureDraft::new(SubjectRefs::new("JOB-1"), ""))
        .await
        .unwrap();

    assert!(queued.file_name.starts_with("evidence-"));
    assert!(queued.file_name.ends_with(".jpg"));
}

#[tokio::test]
async fn test_unopenable_database_runs_memory_only() {
    let config = CoreConfig::builder()
        .database_path("/dev/null/evidence.db")
        .upload_endpoint("https://api.example.com/evidence")
        .http_client(Arc::new(RecordingHttpClient::default()))
        .capability_gate(Arc::new(AllowAll))
        .build()
        .unwrap();

    let core = EvidenceCore::bootstrap(config).await.unwrap();
    assert!(!core.is_durable().await);

    let session = core.capture_session().unwrap();
    session
        .submit(png(32, 32), label(), CaptureDraft::new(SubjectRefs::new("JOB-1"), ""))
        .await
        .unwrap();
    assert_eq!(core.list().await.len(), 1);
}

#[tokio::test]
async fn test_retry_unknown_upload() {
    let core = core_with(Arc::new(AllowAll), Arc::new(RecordingHttpClient::default())).await;

    let result = core.retry(&UploadId::new()).await;
    assert!(matches!(result, Err(CoreError::UploadNotFound(_))));
    assert!(!core.remove(&UploadId::new()).await.unwrap());
}

#[tokio::test]
async fn test_request_sync_requires_driver() {
    let core = core_with(Arc::new(AllowAll), Arc::new(RecordingHttpClient::default())).await;
    assert!(core
        .request_sync(core_sync::SyncTrigger::Manual)
        .await
        .is_err());

    core.start_driver().await;
    core.request_sync(core_sync::SyncTrigger::Foreground)
        .await
        .unwrap();

    core.shutdown().await;
    assert!(core
        .request_sync(core_sync::SyncTrigger::Manual)
        .await
        .is_err());
}
