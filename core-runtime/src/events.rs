//! # Event Bus System
//!
//! Broadcasts queue and sync state changes to UI collaborators using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: typed enums per domain (`QueueEvent`, `SyncEvent`,
//!   `CaptureEvent`) wrapped in [`CoreEvent`]
//! - **EventBus**: the broadcast sender shared by every publisher
//! - **EventStream**: a receiver with an optional filter
//!
//! ```text
//! ┌──────────────┐   emit   ┌───────────┐  subscribe  ┌──────────┐
//! │ Queue        ├─────────>│           ├────────────>│ UI list  │
//! └──────────────┘          │ EventBus  │             └──────────┘
//! ┌──────────────┐   emit   │           │  subscribe  ┌──────────┐
//! │ Sync engine  ├─────────>│           ├────────────>│ Badge    │
//! └──────────────┘          └───────────┘             └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, QueueEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Queue(_)));
//!
//! bus.emit(CoreEvent::Queue(QueueEvent::Removed {
//!     upload_id: "6f0c".to_string(),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Upload removed from queue");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal;
//!   a UI should re-read the queue listing.
//! - **`RecvError::Closed`**: all senders dropped. Treat as shutdown.
//!
//! Publishers ignore the error returned when nobody is subscribed.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Queue content and item status changes
    Queue(QueueEvent),
    /// Sync pass progress
    Sync(SyncEvent),
    /// Capture flow outcomes that never reach the queue
    Capture(CaptureEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Queue(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Capture(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Capture(CaptureEvent::WatermarkFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::UploadFailed {
                retryable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::UploadFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Queue(QueueEvent::PersistenceDegraded { .. }) => EventSeverity::Warning,
            CoreEvent::Capture(CaptureEvent::Denied) => EventSeverity::Warning,
            CoreEvent::Queue(QueueEvent::Enqueued { .. }) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::PersistenceRecovered { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::UploadDelivered { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::PassCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Queue Events
// ============================================================================

/// Changes to the upload queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// A new item entered the queue in `pending` state.
    Enqueued {
        upload_id: String,
        job_id: String,
        /// Creation time (Unix epoch milliseconds).
        created_at_ms: i64,
        payload_bytes: u64,
    },
    /// An item moved to a new status.
    StatusChanged {
        upload_id: String,
        /// `pending`, `uploading` or `error`.
        status: String,
        /// Failure reason, present only for `error`.
        last_error: Option<String>,
    },
    /// An item left the queue (delivered or cancelled).
    Removed { upload_id: String },
    /// The queue was emptied.
    Cleared { removed: u64 },
    /// Persisted items were restored at startup.
    Restored { count: u64 },
    /// A store call failed. Affected changes live in memory only until a
    /// later call writes them through.
    PersistenceDegraded { reason: String },
    /// Every change held back by earlier store failures has been written.
    PersistenceRecovered { flushed: u64 },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Enqueued { .. } => "Upload queued",
            QueueEvent::StatusChanged { .. } => "Upload status changed",
            QueueEvent::Removed { .. } => "Upload removed from queue",
            QueueEvent::Cleared { .. } => "Queue cleared",
            QueueEvent::Restored { .. } => "Queue restored from storage",
            QueueEvent::PersistenceDegraded { .. } => "Queue running without persistence",
            QueueEvent::PersistenceRecovered { .. } => "Queue persistence recovered",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Progress of sync passes against the remote API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A pass took its snapshot.
    PassStarted {
        pass_id: String,
        /// Items selected for this pass.
        eligible: u64,
        /// Orphaned `uploading` items reclaimed at pass start.
        recovered: u64,
    },
    /// The remote accepted an item.
    UploadDelivered {
        pass_id: String,
        upload_id: String,
        http_status: u16,
    },
    /// An item's attempt failed.
    UploadFailed {
        pass_id: String,
        upload_id: String,
        /// `network`, `server_rejected`, `server_transient` or `interrupted`.
        kind: String,
        message: String,
        /// Whether the next pass picks it up without user action.
        retryable: bool,
    },
    /// A pass finished.
    PassCompleted {
        pass_id: String,
        attempted: u64,
        delivered: u64,
        failed: u64,
        duration_ms: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::PassStarted { .. } => "Sync pass started",
            SyncEvent::UploadDelivered { .. } => "Upload delivered",
            SyncEvent::UploadFailed { .. } => "Upload failed",
            SyncEvent::PassCompleted { .. } => "Sync pass completed",
        }
    }
}

// ============================================================================
// Capture Events
// ============================================================================

/// Capture attempts that ended before reaching the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CaptureEvent {
    /// The capability gate refused capture.
    Denied,
    /// The image could not be watermarked; nothing was queued.
    WatermarkFailed { message: String },
}

impl CaptureEvent {
    fn description(&self) -> &str {
        match self {
            CaptureEvent::Denied => "Capture not permitted",
            CaptureEvent::WatermarkFailed { .. } => "Watermarking failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cheap to clone; all clones share one channel. Slow subscribers receive
/// `RecvError::Lagged` rather than blocking publishers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
