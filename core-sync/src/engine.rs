//! # Sync Engine
//!
//! Runs sync passes over the upload queue.
//!
//! ## Workflow
//!
//! 1. Take the pass lock; a caller that finds it held records a rerun and
//!    returns a coalesced report
//! 2. Reclaim `uploading` items left over from an earlier pass or process
//! 3. Snapshot the queue and keep pending and retryable failed items
//! 4. In creation order, wait for a fan-out permit, lease the item and submit
//!    it on its own task
//! 5. Delivered items are removed; failed items are marked `error` with the
//!    classified reason
//! 6. Run another round if a trigger arrived meanwhile
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(queue, http_client, SyncConfig::new(endpoint), event_bus);
//! let report = engine.run_pass().await;
//! println!("delivered {} of {}", report.delivered, report.attempted);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_traits::http::HttpClient;
use core_queue::{QueueRepository, QueuedUpload, UploadFailure, UploadId, UploadStatus};
use core_runtime::config::{CoreConfig, DEFAULT_UPLOAD_FANOUT, MAX_UPLOAD_FANOUT};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::redact_header;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::request::{build_request, classify_error, classify_response};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sync engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Endpoint accepting multipart submissions
    pub endpoint: String,

    /// Headers added to every submission
    pub static_headers: HashMap<String, String>,

    /// Transport timeout per submission
    pub request_timeout: Duration,

    /// Submissions in flight at once (clamped to 1..=MAX_UPLOAD_FANOUT)
    pub max_concurrent_uploads: usize,
}

impl SyncConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            static_headers: HashMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrent_uploads: DEFAULT_UPLOAD_FANOUT,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_uploads(mut self, count: usize) -> Self {
        self.max_concurrent_uploads = count;
        self
    }

    /// Effective fan-out.
    pub fn fanout(&self) -> usize {
        self.max_concurrent_uploads.clamp(1, MAX_UPLOAD_FANOUT)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "Upload endpoint cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            endpoint: config.upload_endpoint.clone(),
            static_headers: config.static_headers.clone(),
            request_timeout: config.request_timeout,
            max_concurrent_uploads: config.max_concurrent_uploads,
        }
    }
}

/// What happened to one item during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Delivered { http_status: u16 },
    Failed { failure: UploadFailure },
    /// The attempt finished but its result could not be written to the queue
    QueueError { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub upload_id: UploadId,
    pub status: OutcomeStatus,
}

impl UploadOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, OutcomeStatus::Delivered { .. })
    }
}

/// Summary of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Id of the first round of this pass
    pub pass_id: String,
    /// Rounds run (more than one when triggers arrived mid-pass)
    pub rounds: u32,
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Orphaned `uploading` items reclaimed
    pub recovered: u64,
    /// Outcomes in completion order
    pub outcomes: Vec<UploadOutcome>,
    pub duration_ms: u64,
    /// Another pass was running; this call only requested a rerun
    pub coalesced: bool,
}

impl SyncReport {
    pub fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::default()
        }
    }

    pub fn outcome(&self, id: &UploadId) -> Option<&OutcomeStatus> {
        self.outcomes
            .iter()
            .find(|outcome| &outcome.upload_id == id)
            .map(|outcome| &outcome.status)
    }

    fn absorb(&mut self, next: SyncReport) {
        self.rounds += next.rounds;
        self.attempted += next.attempted;
        self.delivered += next.delivered;
        self.failed += next.failed;
        self.recovered += next.recovered;
        self.duration_ms += next.duration_ms;
        self.outcomes.extend(next.outcomes);
    }
}

/// Drains the upload queue.
pub struct SyncEngine {
    queue: Arc<QueueRepository>,
    http_client: Arc<dyn HttpClient>,
    config: Arc<SyncConfig>,
    event_bus: EventBus,
    pass_lock: Mutex<()>,
    rerun_requested: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<QueueRepository>,
        http_client: Arc<dyn HttpClient>,
        config: SyncConfig,
        event_bus: EventBus,
    ) -> Self {
        for (name, value) in &config.static_headers {
            debug!(header = %name, value = %redact_header(name, value), "Static upload header");
        }

        Self {
            queue,
            http_client,
            config: Arc::new(config),
            event_bus,
            pass_lock: Mutex::new(()),
            rerun_requested: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run a sync pass.
    ///
    /// Never fails: per-item problems are recorded on the items and in the
    /// report. If a pass is already running this returns
    /// [`SyncReport::coalesced`] at once and the running pass does one more
    /// round before it finishes.
    pub async fn run_pass(&self) -> SyncReport {
        let mut combined: Option<SyncReport> = None;
        let mut rerun_recorded = false;

        loop {
            let guard = match self.pass_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) if combined.is_none() && !rerun_recorded => {
                    // Record first, then look again: the holder may have
                    // checked the flag just before we set it
                    self.rerun_requested.store(true, Ordering::SeqCst);
                    rerun_recorded = true;
                    continue;
                }
                Err(_) => {
                    debug!("Sync pass already running, trigger coalesced");
                    return combined.unwrap_or_else(SyncReport::coalesced);
                }
            };
            self.rerun_requested.store(false, Ordering::SeqCst);

            let report = self.run_round().await;
            drop(guard);

            combined = Some(match combined.take() {
                Some(mut total) => {
                    total.absorb(report);
                    total
                }
                None => report,
            });

            if !self.rerun_requested.load(Ordering::SeqCst) {
                break;
            }
        }

        combined.unwrap_or_else(SyncReport::coalesced)
    }

    #[instrument(skip(self), fields(pass_id = tracing::field::Empty))]
    async fn run_round(&self) -> SyncReport {
        let pass_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("pass_id", pass_id.as_str());
        let started = Instant::now();

        let recovered = match self.queue.reclaim_leases().await {
            Ok(ids) => ids.len() as u64,
            Err(e) => {
                warn!(error = %e, "Failed to reclaim interrupted uploads");
                0
            }
        };

        let eligible: Vec<QueuedUpload> = self
            .queue
            .list()
            .await
            .into_iter()
            .filter(|item| item.status.is_sync_eligible())
            .collect();

        info!(
            eligible = eligible.len(),
            recovered = recovered,
            "Sync pass started"
        );
        self.emit(SyncEvent::PassStarted {
            pass_id: pass_id.clone(),
            eligible: eligible.len() as u64,
            recovered,
        });

        let submitter = Submitter {
            queue: self.queue.clone(),
            http_client: self.http_client.clone(),
            config: self.config.clone(),
            event_bus: self.event_bus.clone(),
            pass_id: pass_id.clone(),
        };
        let semaphore = Arc::new(Semaphore::new(self.config.fanout()));
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::with_capacity(eligible.len());

        for item in eligible {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let leased = match self.queue.lease(&item.id).await {
                Ok(Some(leased)) => leased,
                Ok(None) => {
                    debug!(upload_id = %item.id, "Upload no longer leasable, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(upload_id = %item.id, error = %e, "Failed to lease upload");
                    outcomes.push(UploadOutcome {
                        upload_id: item.id,
                        status: OutcomeStatus::QueueError {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            let submitter = submitter.clone();
            tasks.spawn(async move {
                let outcome = submitter.attempt(leased).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // The item stays leased and is reclaimed by the next pass
                Err(e) => error!(error = %e, "Upload task aborted"),
            }
        }

        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count() as u64;
        let attempted = outcomes.len() as u64;
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            attempted = attempted,
            delivered = delivered,
            failed = attempted - delivered,
            duration_ms = duration_ms,
            "Sync pass completed"
        );
        self.emit(SyncEvent::PassCompleted {
            pass_id: pass_id.clone(),
            attempted,
            delivered,
            failed: attempted - delivered,
            duration_ms,
        });

        SyncReport {
            pass_id,
            rounds: 1,
            attempted,
            delivered,
            failed: attempted - delivered,
            recovered,
            outcomes,
            duration_ms,
            coalesced: false,
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.event_bus.emit(CoreEvent::Sync(event));
    }
}

/// Everything a spawned attempt needs.
#[derive(Clone)]
struct Submitter {
    queue: Arc<QueueRepository>,
    http_client: Arc<dyn HttpClient>,
    config: Arc<SyncConfig>,
    event_bus: EventBus,
    pass_id: String,
}

impl Submitter {
    async fn attempt(self, item: QueuedUpload) -> UploadOutcome {
        let request = build_request(&item, &self.config);
        let result = match self.http_client.execute(request).await {
            Ok(response) => classify_response(&response),
            Err(e) => Err(classify_error(&e)),
        };

        let status = match result {
            Ok(http_status) => self.delivered(&item, http_status).await,
            Err(failure) => self.failed(&item, failure).await,
        };

        UploadOutcome {
            upload_id: item.id,
            status,
        }
    }

    async fn delivered(&self, item: &QueuedUpload, http_status: u16) -> OutcomeStatus {
        if let Err(e) = self.queue.remove(&item.id).await {
            error!(upload_id = %item.id, error = %e, "Delivered upload could not be removed");
            return OutcomeStatus::QueueError {
                message: e.to_string(),
            };
        }

        info!(upload_id = %item.id, http_status = http_status, "Upload delivered");
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::UploadDelivered {
            pass_id: self.pass_id.clone(),
            upload_id: item.id.to_string(),
            http_status,
        }));
        OutcomeStatus::Delivered { http_status }
    }

    async fn failed(&self, item: &QueuedUpload, failure: UploadFailure) -> OutcomeStatus {
        let recorded = self
            .queue
            .set_status(&item.id, UploadStatus::failed(failure.clone()))
            .await;
        if let Err(e) = recorded {
            error!(upload_id = %item.id, error = %e, "Failed upload could not be marked");
            return OutcomeStatus::QueueError {
                message: e.to_string(),
            };
        }

        warn!(
            upload_id = %item.id,
            kind = failure.kind.as_str(),
            http_status = failure.http_status,
            error = %failure.message,
            "Upload failed"
        );
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::UploadFailed {
            pass_id: self.pass_id.clone(),
            upload_id: item.id.to_string(),
            kind: failure.kind.as_str().to_string(),
            message: failure.message.clone(),
            retryable: failure.is_retryable(),
        }));
        OutcomeStatus::Failed { failure }
    }
}
