// HTTP handlers module

mod handle_chunk;
mod handle_performance;
mod handle_preprocess;
mod handle_status;

use crate::perf_store::PerfStore;
use crate::registry::TaskRegistry;
use crate::server::config::ServerConfig;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<TaskRegistry>,
    pub perf: Arc<PerfStore>,
    pub config: ServerConfig,
    pub start_time: Instant,
}

pub use handle_chunk::*;
pub use handle_performance::*;
pub use handle_preprocess::*;
pub use handle_status::*;
