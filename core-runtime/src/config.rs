//! # Core Configuration Module
//!
//! Provides configuration management for the evidence upload core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every bridge and tuning value the queue, watermark and sync layers
//! need. It fails fast when a required capability is missing.
//!
//! ## Required Dependencies
//!
//! - `CapabilityGate` - Host decision whether capture is permitted
//! - `HttpClient` - Upload transport (desktop default: reqwest)
//! - `BlobStore` or a database path - Queue persistence (desktop default: SQLite)
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Starts a sync pass when connectivity is restored
//! - `Clock` - Time source (default: system clock)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use bridge_traits::AllowAll;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/evidence.db")
//!     .upload_endpoint("https://api.example.com/v1/evidence")
//!     .static_header("Authorization", "Bearer ...")
//!     .capability_gate(Arc::new(AllowAll))
//!     .max_concurrent_uploads(2)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Missing bridges produce [`Error::CapabilityMissing`] with a message naming
//! what to inject; out-of-range values produce [`Error::Config`].

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{BlobStore, CapabilityGate, Clock, HttpClient, NetworkMonitor, SystemClock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on concurrent uploads, keeping constrained uplinks usable.
pub const MAX_UPLOAD_FANOUT: usize = 4;

/// Default number of concurrent uploads per sync pass.
pub const DEFAULT_UPLOAD_FANOUT: usize = 2;

/// Default JPEG quality for watermarked output.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Default collection name for the upload queue.
pub const DEFAULT_QUEUE_COLLECTION: &str = "evidence-upload-queue";

/// Core configuration for the evidence upload core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database backing the default blob store
    pub database_path: Option<PathBuf>,

    /// Collection name the queue persists into
    pub queue_collection: String,

    /// Remote endpoint accepting multipart evidence submissions
    pub upload_endpoint: String,

    /// Headers sent with every upload (e.g. authorization)
    pub static_headers: HashMap<String, String>,

    /// Per-request timeout handed to the transport
    pub request_timeout: Duration,

    /// Concurrent uploads per sync pass (1..=MAX_UPLOAD_FANOUT)
    pub max_concurrent_uploads: usize,

    /// Period of the automatic sync trigger
    pub sync_interval: Duration,

    /// JPEG quality of watermarked images (1..=100)
    pub jpeg_quality: u8,

    /// Event bus buffer size
    pub event_buffer_size: usize,

    /// HTTP client for uploads
    pub http_client: Arc<dyn HttpClient>,

    /// Durable store; when absent the default SQLite store is opened at
    /// `database_path`
    pub blob_store: Option<Arc<dyn BlobStore>>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Host capture permission check (required)
    pub capability_gate: Arc<dyn CapabilityGate>,

    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("queue_collection", &self.queue_collection)
            .field("upload_endpoint", &self.upload_endpoint)
            .field(
                "static_headers",
                &self.static_headers.keys().collect::<Vec<_>>(),
            )
            .field("request_timeout", &self.request_timeout)
            .field("max_concurrent_uploads", &self.max_concurrent_uploads)
            .field("sync_interval", &self.sync_interval)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field(
                "blob_store",
                &self.blob_store.as_ref().map(|_| "BlobStore { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("capability_gate", &"CapabilityGate { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - A persistence source exists (blob store or database path)
    /// - The upload endpoint is an http(s) URL
    /// - Fan-out, JPEG quality, interval and buffer size are in range
    pub fn validate(&self) -> Result<()> {
        if self.blob_store.is_none() {
            match &self.database_path {
                Some(path) if !path.as_os_str().is_empty() => {}
                Some(_) => {
                    return Err(Error::Config("Database path cannot be empty".to_string()))
                }
                None => {
                    return Err(Error::Config(
                        "Database path is required when no BlobStore is injected. \
                         Use .database_path() or .blob_store() to set one."
                            .to_string(),
                    ))
                }
            }
        }

        if self.queue_collection.trim().is_empty() {
            return Err(Error::Config(
                "Queue collection name cannot be empty".to_string(),
            ));
        }

        let endpoint = self.upload_endpoint.trim();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Upload endpoint must be an http(s) URL, got '{}'",
                self.upload_endpoint
            )));
        }

        if self.max_concurrent_uploads == 0 || self.max_concurrent_uploads > MAX_UPLOAD_FANOUT {
            return Err(Error::Config(format!(
                "max_concurrent_uploads must be between 1 and {}, got {}",
                MAX_UPLOAD_FANOUT, self.max_concurrent_uploads
            )));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(Error::Config(format!(
                "JPEG quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }

        if self.sync_interval.is_zero() {
            return Err(Error::Config(
                "Sync interval must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn capability_gate_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "CapabilityGate".to_string(),
        message: "A CapabilityGate is required so capture is only offered to permitted users. \
                 Inject the host's permission check, or bridge_traits::AllowAll when the \
                 host has no access rules."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout).map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                 Desktop: ensure the 'desktop-shims' feature is enabled. \
                 Mobile: inject the platform-native adapter."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    queue_collection: Option<String>,
    upload_endpoint: Option<String>,
    static_headers: HashMap<String, String>,
    request_timeout: Option<Duration>,
    max_concurrent_uploads: Option<usize>,
    sync_interval: Option<Duration>,
    jpeg_quality: Option<u8>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    capability_gate: Option<Arc<dyn CapabilityGate>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the database path used by the default SQLite blob store.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/evidence.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the queue collection name.
    ///
    /// Default: [`DEFAULT_QUEUE_COLLECTION`]
    pub fn queue_collection(mut self, name: impl Into<String>) -> Self {
        self.queue_collection = Some(name.into());
        self
    }

    /// Sets the remote endpoint (required).
    pub fn upload_endpoint(mut self, url: impl Into<String>) -> Self {
        self.upload_endpoint = Some(url.into());
        self
    }

    /// Adds a header sent with every upload.
    pub fn static_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the per-request timeout.
    ///
    /// Default: 60 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the number of concurrent uploads per pass.
    ///
    /// Default: [`DEFAULT_UPLOAD_FANOUT`], maximum [`MAX_UPLOAD_FANOUT`]
    pub fn max_concurrent_uploads(mut self, count: usize) -> Self {
        self.max_concurrent_uploads = Some(count);
        self
    }

    /// Sets the period of the automatic sync trigger.
    ///
    /// Default: 5 minutes
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the JPEG quality of watermarked images.
    ///
    /// Default: [`DEFAULT_JPEG_QUALITY`]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = Some(quality);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the blob store implementation.
    ///
    /// If not provided, a SQLite store is opened at the database path during
    /// bootstrap.
    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// Sets the network monitor implementation (optional).
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the capability gate (required).
    pub fn capability_gate(mut self, gate: Arc<dyn CapabilityGate>) -> Self {
        self.capability_gate = Some(gate);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - The upload endpoint or capability gate is missing
    /// - No HTTP client is available
    /// - Configuration values are out of range
    pub fn build(self) -> Result<CoreConfig> {
        let upload_endpoint = self.upload_endpoint.ok_or_else(|| {
            Error::Config(
                "Upload endpoint is required. Use .upload_endpoint() to set it.".to_string(),
            )
        })?;

        let capability_gate = self
            .capability_gate
            .ok_or_else(capability_gate_missing_error)?;

        let request_timeout = self.request_timeout.unwrap_or(Duration::from_secs(60));

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let config = CoreConfig {
            database_path: self.database_path,
            queue_collection: self
                .queue_collection
                .unwrap_or_else(|| DEFAULT_QUEUE_COLLECTION.to_string()),
            upload_endpoint,
            static_headers: self.static_headers,
            request_timeout,
            max_concurrent_uploads: self
                .max_concurrent_uploads
                .unwrap_or(DEFAULT_UPLOAD_FANOUT),
            sync_interval: self.sync_interval.unwrap_or(Duration::from_secs(300)),
            jpeg_quality: self.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            blob_store: self.blob_store,
            network_monitor: self.network_monitor,
            capability_gate,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
