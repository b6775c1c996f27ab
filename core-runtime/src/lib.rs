//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the evidence upload core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for queue and sync state changes
//!
//! Every other core crate depends on this one for its event types and for
//! the shared [`CoreConfig`](config::CoreConfig).

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
