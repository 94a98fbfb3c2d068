// Route setup and configuration

use crate::constants;
use crate::perf_store::PerfStore;
use crate::registry::TaskRegistry;
use crate::server::ServerState;
use crate::server::config::ServerConfig;
use crate::server::handlers::{handle_chunk, handle_performance, handle_preprocess, handle_root, handle_status};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

pub fn create_router(
    registry: Arc<TaskRegistry>,
    perf: Arc<PerfStore>,
    config: ServerConfig,
    start_time: Instant,
) -> Router {
    Router::new()
        .route("/", axum::routing::get(handle_root))
        .route(constants::PREPROCESS_PATH, axum::routing::post(handle_preprocess))
        .route(constants::CHUNK_PATH, axum::routing::get(handle_chunk))
        .route(constants::PERFORMANCE_PATH, axum::routing::get(handle_performance))
        .route("/status", axum::routing::get(handle_status))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(ServerState {
            registry,
            perf,
            config,
            start_time,
        })
}
