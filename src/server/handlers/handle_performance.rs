// Session trace handler

use crate::server::ServerState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    pub session_id: String,
}

pub async fn handle_performance(
    State(state): State<ServerState>,
    Query(query): Query<PerformanceQuery>,
) -> impl IntoResponse {
    let records = state.perf.records(&query.session_id);
    (
        StatusCode::OK,
        axum::Json(json!({
            "session_id": query.session_id,
            "records": records,
        })),
    )
        .into_response()
}
