//! Demo application served behind the server connector.
//!
//! Handlers are protocol-unaware: they read and write ordinary bodies and
//! never see marker headers.

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Largest body `/payload/{size}` will generate.
pub const MAX_GENERATED_BYTES: u64 = 256 * 1024 * 1024;

/// Deterministic filler used by `/payload/{size}`.
pub fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Return the request body unchanged, with its content type.
pub async fn echo(headers: HeaderMap, body: Bytes) -> Response {
    tracing::debug!(bytes = body.len(), "Echoing request body");
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Produce `size` bytes of filler.
pub async fn payload(Path(size): Path<u64>) -> Response {
    if size > MAX_GENERATED_BYTES {
        return (StatusCode::BAD_REQUEST, "Requested payload too large").into_response();
    }
    let body = pattern(size as usize);
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))],
        body,
    )
        .into_response()
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
