// Preprocess handler: register a task and reply with the chunk layout

use crate::preprocess::{self, PreprocessError, PreprocessRequest};
use crate::server::ServerState;
use crate::server::error::{bad_request, internal_error};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

pub async fn handle_preprocess(
    State(state): State<ServerState>,
    axum::Json(request): axum::Json<PreprocessRequest>,
) -> impl IntoResponse {
    log::debug!(
        "[Server] preprocess {} chunk_size={}",
        request.file,
        request.chunk_size
    );

    match preprocess::preprocess(
        Arc::clone(&state.registry),
        Arc::clone(&state.perf),
        &state.config.data_dir,
        request,
    )
    .await
    {
        Ok(response) => (StatusCode::OK, axum::Json(response)).into_response(),
        Err(PreprocessError::Validation(msg)) => bad_request(&msg),
        Err(PreprocessError::Internal(e)) => internal_error(&format!("{:#}", e)),
    }
}
