//! Capture flow: permission check, watermark, enqueue.

use std::sync::Arc;

use bridge_traits::gate::CapabilityGate;
use bridge_traits::time::Clock;
use bytes::Bytes;
use core_queue::{QueueRepository, QueuedUpload, SubjectRefs, UploadDraft};
use core_runtime::events::{CaptureEvent, CoreEvent, EventBus};
use core_runtime::logging::coarse_coordinates;
use core_watermark::{apply_watermark, WatermarkError, WatermarkLabel, WatermarkOptions};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};

/// Descriptive fields supplied by the capture form.
#[derive(Debug, Clone)]
pub struct CaptureDraft {
    pub subject: SubjectRefs,
    pub note: String,
    /// Defaults to `evidence-<unix ms>.jpg`
    pub file_name: Option<String>,
}

impl CaptureDraft {
    pub fn new(subject: SubjectRefs, note: impl Into<String>) -> Self {
        Self {
            subject,
            note: note.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Entry point for captures.
#[derive(Clone)]
pub struct CaptureService {
    gate: Arc<dyn CapabilityGate>,
    session: CaptureSession,
}

impl CaptureService {
    pub fn new(
        gate: Arc<dyn CapabilityGate>,
        queue: Arc<QueueRepository>,
        options: WatermarkOptions,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            gate,
            session: CaptureSession {
                queue,
                options,
                clock,
                event_bus,
            },
        }
    }

    /// Open a capture session if the gate allows it.
    ///
    /// The gate is consulted here only; a session stays valid for its
    /// lifetime.
    pub fn session(&self) -> Result<CaptureSession> {
        if !self.gate.can_capture() {
            info!("Capture refused by capability gate");
            let _ = self
                .session
                .event_bus
                .emit(CoreEvent::Capture(CaptureEvent::Denied));
            return Err(CoreError::CaptureNotPermitted);
        }
        Ok(self.session.clone())
    }
}

/// A permitted capture context.
#[derive(Clone)]
pub struct CaptureSession {
    queue: Arc<QueueRepository>,
    options: WatermarkOptions,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl CaptureSession {
    /// Watermark `raw` with `label` and enqueue it.
    ///
    /// On a watermark failure nothing is queued and the error is returned.
    /// The watermark runs on the blocking pool and is not cancelled if the
    /// caller stops waiting.
    pub async fn submit(
        &self,
        raw: Bytes,
        label: WatermarkLabel,
        draft: CaptureDraft,
    ) -> Result<QueuedUpload> {
        let coordinate_label = label.coordinates.clone();
        let options = self.options;
        let input_bytes = raw.len();

        let watermarked =
            tokio::task::spawn_blocking(move || apply_watermark(&raw, &label, &options))
                .await
                .map_err(|e| WatermarkError::Encode(format!("watermark task failed: {}", e)))
                .and_then(|result| result);

        let image = match watermarked {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, input_bytes = input_bytes, "Capture could not be watermarked");
                let _ = self
                    .event_bus
                    .emit(CoreEvent::Capture(CaptureEvent::WatermarkFailed {
                        message: e.to_string(),
                    }));
                return Err(e.into());
            }
        };

        let file_name = draft.file_name.unwrap_or_else(|| {
            format!("evidence-{}.jpg", self.clock.unix_timestamp_millis())
        });
        debug!(
            job_id = %draft.subject.job_id,
            file_name = %file_name,
            coordinates = %coarse_coordinates(&coordinate_label),
            output_bytes = image.len(),
            "Capture watermarked"
        );

        let upload = UploadDraft::new(
            draft.subject,
            draft.note,
            coordinate_label,
            file_name,
            image,
        );
        Ok(self.queue.enqueue(upload).await?)
    }
}
