// Server startup: registry and perf store construction, the sweep task and
// the axum serve loop with graceful shutdown

use crate::constants;
use crate::perf_store::PerfStore;
use crate::registry::TaskRegistry;
use crate::runtime::Shutdown;
use crate::server::{Server, ServerConfig};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::Duration;

/// Configuration for server startup
pub struct StartupConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub task_ttl: Duration,
    pub verbose: bool,
}

/// Start the HTTP server and block until shutdown
pub async fn start_server(config: StartupConfig) -> Result<()> {
    if !config.data_dir.is_dir() {
        anyhow::bail!(
            "data directory not found: {} (create it or pass --data-dir)",
            config.data_dir.display()
        );
    }

    let registry = Arc::new(TaskRegistry::new(config.task_ttl));
    let perf = Arc::new(PerfStore::new());
    let shutdown = Shutdown::new();

    let mut helpers: JoinSet<()> = JoinSet::new();
    helpers.spawn(sweep_loop(Arc::clone(&registry), shutdown.subscribe()));

    let server = Server::new(
        Arc::clone(&registry),
        Arc::clone(&perf),
        ServerConfig {
            data_dir: config.data_dir.clone(),
            version: constants::VERSION.to_string(),
        },
    );
    let app = server.router();

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    eprintln!(
        "{} server v{} listening on http://{} (data: {}, ttl: {}s)",
        constants::BINARY_NAME,
        constants::VERSION,
        listener.local_addr()?,
        config.data_dir.display(),
        config.task_ttl.as_secs(),
    );
    if config.verbose {
        log::debug!("[Server] task sweep every {}s", constants::TASK_SWEEP_INTERVAL_SECS);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
        .context("server error")?;

    shutdown.stop_helpers(&mut helpers).await;
    eprintln!("server stopped");
    Ok(())
}

/// Periodically drop tasks past their TTL until shutdown
async fn sweep_loop(registry: Arc<TaskRegistry>, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(constants::TASK_SWEEP_INTERVAL_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let before = registry.stats().tasks;
                registry.sweep(Instant::now());
                let after = registry.stats().tasks;
                if after < before {
                    log::debug!("[Sweep] reclaimed {} expired task(s)", before - after);
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
