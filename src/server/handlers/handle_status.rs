// Root and status handlers

use crate::constants;
use crate::server::ServerState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

pub async fn handle_root(State(state): State<ServerState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        format!(
            "{} server v{}\n\nPOST {}\nGET  {}?task_id=...&chunk_index=N\nGET  {}?session_id=...\nGET  /status\n",
            constants::BINARY_NAME,
            state.config.version,
            constants::PREPROCESS_PATH,
            constants::CHUNK_PATH,
            constants::PERFORMANCE_PATH,
        ),
    )
}

pub async fn handle_status(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = state.registry.stats();
    let tasks: Vec<serde_json::Value> = state
        .registry
        .snapshot()
        .into_iter()
        .map(|t| {
            json!({
                "task_id": t.task_id,
                "shape": t.shape,
                "data_length": t.data_length,
                "chunk_size": t.chunk_size,
                "pending": t.pending,
                "ready": t.ready,
                "consumed": t.consumed,
            })
        })
        .collect();

    let response = json!({
        "server": {
            "version": state.config.version,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "data_dir": state.config.data_dir.display().to_string(),
            "task_ttl_seconds": state.registry.ttl().as_secs(),
        },
        "tasks": {
            "count": stats.tasks,
            "pending_chunks": stats.pending_chunks,
            "ready_chunks": stats.ready_chunks,
            "active": tasks,
        },
        "performance": {
            "sessions": state.perf.session_count(),
        }
    });

    (StatusCode::OK, axum::Json(response)).into_response()
}
