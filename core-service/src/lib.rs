//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, blob store,
//! network monitor, capability gate) into the evidence upload core. Desktop
//! apps typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) so the HTTP client and SQLite store are provided by
//! default; mobile hosts inject their own adapters through
//! [`CoreConfig`](core_runtime::config::CoreConfig).
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/app/evidence.db")
//!     .upload_endpoint("https://api.example.com/evidence")
//!     .capability_gate(Arc::new(RoleGate::new(user)))
//!     .build()?;
//!
//! let core = EvidenceCore::bootstrap(config).await?;
//! core.start_driver().await;
//!
//! let session = core.capture_session()?;
//! session.submit(jpeg, label, CaptureDraft::new(SubjectRefs::new("JOB-1"), "")).await?;
//! ```

pub mod capture;
pub mod error;

pub use capture::{CaptureDraft, CaptureService, CaptureSession};
pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::storage::BlobStore;
use core_queue::{QueueRepository, QueueStats, QueuedUpload, UploadId};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{
    DriverConfig, SyncConfig, SyncDriver, SyncEngine, SyncError, SyncHandle, SyncReport,
    SyncTrigger,
};
use core_watermark::WatermarkOptions;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Primary façade exposed to host applications.
pub struct EvidenceCore {
    config: CoreConfig,
    event_bus: EventBus,
    queue: Arc<QueueRepository>,
    engine: Arc<SyncEngine>,
    capture: CaptureService,
    driver: Mutex<Option<SyncHandle>>,
    cancel: CancellationToken,
}

impl EvidenceCore {
    /// Build the core from a validated configuration.
    ///
    /// A blob store that cannot be opened does not fail bootstrap; the queue
    /// runs memory-only instead (see [`is_durable`](Self::is_durable)).
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let store = match &config.blob_store {
            Some(store) => Some(store.clone()),
            None => open_default_store(&config).await,
        };

        let queue =
            Arc::new(QueueRepository::open(store, config.clock.clone(), event_bus.clone()).await);

        let sync_config = SyncConfig::from(&config);
        sync_config.validate()?;
        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            config.http_client.clone(),
            sync_config,
            event_bus.clone(),
        ));

        let capture = CaptureService::new(
            config.capability_gate.clone(),
            queue.clone(),
            WatermarkOptions::default().with_quality(config.jpeg_quality),
            config.clock.clone(),
            event_bus.clone(),
        );

        info!(
            endpoint = %config.upload_endpoint,
            durable = queue.is_durable().await,
            "Evidence core ready"
        );

        Ok(Self {
            config,
            event_bus,
            queue,
            engine,
            capture,
            driver: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// Open a capture session; fails with [`CoreError::CaptureNotPermitted`]
    /// when the capability gate refuses.
    pub fn capture_session(&self) -> Result<CaptureSession> {
        self.capture.session()
    }

    pub async fn list(&self) -> Vec<QueuedUpload> {
        self.queue.list().await
    }

    pub async fn get(&self, id: &UploadId) -> Option<QueuedUpload> {
        self.queue.get(id).await
    }

    /// Re-arm a failed upload so the next pass picks it up.
    pub async fn retry(&self, id: &UploadId) -> Result<QueuedUpload> {
        self.queue
            .retry(id)
            .await?
            .ok_or_else(|| CoreError::UploadNotFound(id.to_string()))
    }

    /// Cancel an upload. Returns `false` if it was already gone.
    pub async fn remove(&self, id: &UploadId) -> Result<bool> {
        Ok(self.queue.remove(id).await?)
    }

    pub async fn stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    pub async fn is_durable(&self) -> bool {
        self.queue.is_durable().await
    }

    /// Run a pass now and wait for it.
    pub async fn sync_now(&self) -> SyncReport {
        self.engine.run_pass().await
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Start the background driver. Does nothing if it is already running.
    pub async fn start_driver(&self) {
        let mut driver = self.driver.lock().await;
        if driver.as_ref().is_some_and(SyncHandle::is_running) {
            return;
        }

        let config = DriverConfig {
            interval: self.config.sync_interval,
            ..DriverConfig::default()
        };
        *driver = Some(SyncDriver::spawn(
            self.engine.clone(),
            config,
            self.config.network_monitor.clone(),
            self.cancel.child_token(),
        ));
    }

    /// Ask the background driver for a pass without waiting for it.
    pub async fn request_sync(&self, trigger: SyncTrigger) -> Result<()> {
        match self.driver.lock().await.as_ref() {
            Some(handle) => Ok(handle.trigger(trigger)?),
            None => Err(SyncError::DriverStopped.into()),
        }
    }

    /// Stop the background driver, letting a running pass finish.
    ///
    /// The driver cannot be restarted afterwards.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.driver.lock().await.take() {
            handle.shutdown().await;
        }
    }

    pub fn queue(&self) -> Arc<QueueRepository> {
        self.queue.clone()
    }
}

#[cfg(feature = "desktop-shims")]
async fn open_default_store(config: &CoreConfig) -> Option<Arc<dyn BlobStore>> {
    use bridge_desktop::{default_database_path, SqliteBlobStore};

    let path = config
        .database_path
        .clone()
        .or_else(default_database_path)?;

    match SqliteBlobStore::open(&path, config.queue_collection.clone()).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(path = ?path, error = %e, "Failed to open blob store");
            None
        }
    }
}

#[cfg(not(feature = "desktop-shims"))]
async fn open_default_store(_config: &CoreConfig) -> Option<Arc<dyn BlobStore>> {
    warn!("No BlobStore injected and desktop shims are disabled");
    None
}
