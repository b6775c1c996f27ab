//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host must implement for the evidence
//! upload core.
//!
//! ## Overview
//!
//! The core never touches the filesystem, the network or the permission model
//! directly. Every such capability is reached through one of the traits below,
//! so the queue and sync logic can run unchanged on desktop, mobile and in
//! tests with scripted doubles.
//!
//! ## Traits
//!
//! ### Persistence
//! - [`BlobStore`](storage::BlobStore) - Key-addressed durable records with binary attachments
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with multipart bodies
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection and change notifications
//!
//! ### Access Control
//! - [`CapabilityGate`](gate::CapabilityGate) - Host decision whether capture is reachable
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and include context such as the collection
//! name or URL.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod gate;
pub mod http;
pub mod logging;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use gate::{AllowAll, CapabilityGate, DenyAll};
pub use http::{HttpBody, HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartField};
pub use logging::{BufferedLogger, LogEntry, LogLevel, LoggerSink};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{BlobStore, StoredRecord};
pub use time::{Clock, ManualClock, SystemClock};
