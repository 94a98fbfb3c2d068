// JSON error responses for the chunk protocol.
//
// Chunk reads are destructive, so every response on this API is marked
// uncacheable, errors included: a proxy replaying a cached 404 or 400 would
// mask the live slot state from the retrying client.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Uncacheable JSON `{"error": ...}` response
pub fn error_response(status: StatusCode, message: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    (status, headers, axum::Json(json!({"error": message}))).into_response()
}

/// 400: rejected input, or a chunk slot that was already consumed
pub fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

/// 404: unknown or expired task, or an out-of-range chunk index
pub fn not_found(message: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, message)
}

/// 500: shape read or background parse failure
pub fn internal_error(message: &str) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}
