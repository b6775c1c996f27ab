//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `BlobStore` using SQLite via `sqlx` ([`SqliteBlobStore`])
//! - `HttpClient` using `reqwest` with multipart bodies ([`ReqwestHttpClient`])
//! - `NetworkMonitor` using a TCP reachability probe ([`DesktopNetworkMonitor`])
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_database_path, ReqwestHttpClient, SqliteBlobStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let path = default_database_path().unwrap_or_else(|| "evidence.db".into());
//!     let store = SqliteBlobStore::open(path, "evidence-upload-queue").await?;
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod blob_store;
mod http;
mod network;

pub use blob_store::{default_database_path, SqliteBlobStore};
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
