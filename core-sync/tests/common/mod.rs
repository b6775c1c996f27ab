//! Shared doubles for sync tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::SystemClock;
use core_queue::{QueueRepository, SubjectRefs, UploadDraft};
use core_runtime::events::EventBus;
use core_sync::request::IDEMPOTENCY_HEADER;
use core_watermark::{apply_watermark, WatermarkLabel, WatermarkOptions};
use image::{ImageFormat, Rgb, RgbImage};
use tokio::sync::{Notify, Semaphore};

/// What the scripted server answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    Transport(String),
}

/// A submission as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub job_id: String,
    pub client_upload_id: String,
    pub idempotency_key: String,
}

/// Scripted `HttpClient`.
///
/// Replies come from a per-job script first, then the shared script, then
/// default to 201.
#[derive(Default)]
pub struct ScriptedHttpClient {
    shared: Mutex<VecDeque<Reply>>,
    per_job: Mutex<HashMap<String, VecDeque<Reply>>>,
    seen: Mutex<Vec<Seen>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    pub started: Arc<Notify>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request waits for a permit on `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push(&self, reply: Reply) {
        self.shared.lock().unwrap().push_back(reply);
    }

    pub fn push_for_job(&self, job_id: &str, reply: Reply) {
        self.per_job
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, job_id: &str) -> Reply {
        if let Some(reply) = self
            .per_job
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(|script| script.pop_front())
        {
            return reply;
        }
        self.shared
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Status(201))
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let job_id = request.multipart_text("job_id").unwrap_or_default().to_string();
        self.seen.lock().unwrap().push(Seen {
            job_id: job_id.clone(),
            client_upload_id: request
                .multipart_text("client_upload_id")
                .unwrap_or_default()
                .to_string(),
            idempotency_key: request
                .headers
                .get(IDEMPOTENCY_HEADER)
                .cloned()
                .unwrap_or_default(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.next_reply(&job_id) {
            Reply::Status(status) => Ok(HttpResponse::new(status)),
            Reply::Transport(message) => Err(BridgeError::OperationFailed(message)),
        }
    }
}

pub fn draft(job_id: &str) -> UploadDraft {
    let mut png = Vec::new();
    RgbImage::from_pixel(40, 30, Rgb([200, 180, 160]))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    let image = apply_watermark(
        &png,
        &WatermarkLabel::new("2024-01-15 10:00:00", "-6.810000,107.140000"),
        &WatermarkOptions::default(),
    )
    .unwrap();
    UploadDraft::new(
        SubjectRefs::new(job_id),
        "meter reading",
        "-6.81,107.14",
        format!("{}.jpg", job_id),
        image,
    )
}

pub async fn memory_queue(event_bus: EventBus) -> Arc<QueueRepository> {
    Arc::new(QueueRepository::open(None, Arc::new(SystemClock), event_bus).await)
}
