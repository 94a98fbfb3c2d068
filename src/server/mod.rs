// HTTP server for the voxel-grid chunk protocol

#[cfg(feature = "server")]
mod config;
#[cfg(feature = "server")]
mod error;
#[cfg(feature = "server")]
mod handlers;
#[cfg(feature = "server")]
mod routes;
#[cfg(feature = "server")]
mod startup;

#[cfg(feature = "server")]
use crate::perf_store::PerfStore;
#[cfg(feature = "server")]
use crate::registry::TaskRegistry;
#[cfg(feature = "server")]
use axum::Router;
#[cfg(feature = "server")]
use std::sync::Arc;
#[cfg(feature = "server")]
use std::time::Instant;

#[cfg(feature = "server")]
pub use config::ServerConfig;
#[cfg(feature = "server")]
pub use handlers::ServerState;
#[cfg(feature = "server")]
pub use startup::{StartupConfig, start_server};

#[cfg(feature = "server")]
pub struct Server {
    registry: Arc<TaskRegistry>,
    perf: Arc<PerfStore>,
    config: ServerConfig,
    start_time: Instant,
}

#[cfg(feature = "server")]
impl Server {
    pub fn new(registry: Arc<TaskRegistry>, perf: Arc<PerfStore>, config: ServerConfig) -> Self {
        Self {
            registry,
            perf,
            config,
            start_time: Instant::now(),
        }
    }

    pub fn router(&self) -> Router {
        routes::create_router(
            Arc::clone(&self.registry),
            Arc::clone(&self.perf),
            self.config.clone(),
            self.start_time,
        )
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }
}
