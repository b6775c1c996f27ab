//! Remote submission: request shape and outcome classification.

use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse, MultipartField};
use core_queue::{QueuedUpload, UploadFailure, UploadId};
use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::engine::SyncConfig;

/// Header carrying the dedup token.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Multipart field holding the photo.
pub const PHOTO_FIELD: &str = "photo";

const DEDUP_DOMAIN: &str = "evidence-upload:";
const MAX_BODY_IN_MESSAGE: usize = 200;

/// Stable dedup token for an upload: hex SHA-256 of its id.
///
/// Depends only on the id, so every retry of an item sends the same token.
pub fn dedup_token(id: &UploadId) -> String {
    let digest = Sha256::digest(format!("{}{}", DEDUP_DOMAIN, id).as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{:02x}", byte);
        out
    })
}

/// Multipart POST for `item`.
pub fn build_request(item: &QueuedUpload, config: &SyncConfig) -> HttpRequest {
    let mut fields = vec![MultipartField::text("job_id", &item.subject.job_id)];
    if let Some(component_id) = &item.subject.component_id {
        fields.push(MultipartField::text("component_id", component_id));
    }
    if let Some(recipient_id) = &item.subject.recipient_id {
        fields.push(MultipartField::text("recipient_id", recipient_id));
    }
    fields.push(MultipartField::text("note", &item.note));
    fields.push(MultipartField::text("coordinates", &item.coordinate_label));
    fields.push(MultipartField::text("client_upload_id", item.id.to_string()));
    fields.push(MultipartField::file(
        PHOTO_FIELD,
        &item.file_name,
        "image/jpeg",
        item.payload.clone(),
    ));

    let request = config
        .static_headers
        .iter()
        .fold(HttpRequest::new(HttpMethod::Post, &config.endpoint), |req, (k, v)| {
            req.header(k, v)
        });

    request
        .header(IDEMPOTENCY_HEADER, dedup_token(&item.id))
        .timeout(config.request_timeout)
        .multipart(fields)
}

/// Map a response to delivery (`Ok(status)`) or a recorded failure.
///
/// 408, 425 and 429 count as transient even though they are 4xx.
pub fn classify_response(response: &HttpResponse) -> std::result::Result<u16, UploadFailure> {
    let status = response.status;
    if response.is_success() {
        return Ok(status);
    }

    let message = describe(response);
    match status {
        408 | 425 | 429 => Err(UploadFailure::transient(status, message)),
        _ if response.is_client_error() => Err(UploadFailure::rejected(status, message)),
        _ => Err(UploadFailure::transient(status, message)),
    }
}

/// Transport errors (including timeouts) are network failures.
pub fn classify_error(error: &BridgeError) -> UploadFailure {
    match error {
        BridgeError::Timeout(detail) => UploadFailure::network(format!("timed out: {}", detail)),
        other => UploadFailure::network(other.to_string()),
    }
}

fn describe(response: &HttpResponse) -> String {
    let body = String::from_utf8_lossy(&response.body);
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {}", response.status);
    }

    let snippet: String = body.chars().take(MAX_BODY_IN_MESSAGE).collect();
    format!("HTTP {}: {}", response.status, snippet)
}
