// Chunk delivery handler: destructive read against the task registry

use crate::perf::{ChannelIndex, PerfRecord, now_ms};
use crate::registry::TakeResult;
use crate::server::ServerState;
use crate::server::error::{bad_request, internal_error, not_found};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    pub task_id: String,
    pub chunk_index: u32,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Success and not-ready headers. Error arms get the same `no-store`
/// treatment through the helpers in `server::error`; a successful read
/// consumes the slot, so no response on this endpoint may be replayed by an
/// intermediary.
fn no_store_headers(content_type: Option<&'static str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(content_type) = content_type {
        headers.insert("Content-Type", HeaderValue::from_static(content_type));
    }
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers
}

pub async fn handle_chunk(
    State(state): State<ServerState>,
    Query(query): Query<ChunkQuery>,
) -> impl IntoResponse {
    let take_start = now_ms();

    match state.registry.take_chunk(&query.task_id, query.chunk_index) {
        TakeResult::Ready(bytes) => {
            if let Some(session_id) = &query.session_id {
                state.perf.record(
                    session_id,
                    PerfRecord {
                        start_ms: take_start,
                        end_ms: now_ms(),
                        channel_group: "server".to_string(),
                        channel_index: ChannelIndex::Name("chunk".to_string()),
                        msg: format!("delivered chunk {} ({} bytes)", query.chunk_index, bytes.len()),
                    },
                );
            }
            (
                StatusCode::OK,
                no_store_headers(Some("application/octet-stream")),
                bytes,
            )
                .into_response()
        }
        TakeResult::NotReady => (StatusCode::ACCEPTED, no_store_headers(None)).into_response(),
        TakeResult::NotFound => not_found("task or chunk not found"),
        TakeResult::AlreadyConsumed => {
            bad_request(&format!("chunk {} already consumed", query.chunk_index))
        }
        TakeResult::Failed(msg) => internal_error(&msg),
    }
}
