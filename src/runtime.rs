//! Shutdown coordination between the serve loop and the registry sweeper

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Either side may end the server: Ctrl+C from the terminal, or a helper
/// task that hit an unrecoverable error. A fatal request abandons queued
/// work instead of draining it.
#[derive(Clone)]
pub struct Shutdown {
    requested: watch::Sender<bool>,
    fatal: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (requested, _) = watch::channel(false);
        Self {
            requested,
            fatal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver for helper tasks; flips to true once shutdown begins
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.requested.subscribe()
    }

    /// Begin an orderly shutdown
    pub fn request(&self) {
        let _ = self.requested.send(true);
    }

    /// Shut down after an unrecoverable error; helpers are aborted rather
    /// than drained
    pub fn request_fatal(&self) {
        self.fatal.store(true, Ordering::Relaxed);
        self.request();
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Relaxed)
    }

    /// Future for axum's graceful shutdown: resolves on Ctrl+C or on the
    /// first `request`, whichever comes first
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.requested.subscribe();
        async move {
            tokio::select! {
                _ = signal::ctrl_c() => {
                    log::info!("[Shutdown] interrupt received, stopping chunk server");
                }
                changed = rx.changed() => {
                    if changed.is_ok() && *rx.borrow() {
                        log::info!("[Shutdown] requested by a helper task");
                    }
                }
            }
        }
    }

    /// Stop the sweeper and any other helpers: signal them, abort on a fatal
    /// shutdown, then collect whatever is left
    pub async fn stop_helpers(&self, helpers: &mut JoinSet<()>) {
        self.request();
        if self.is_fatal() {
            log::warn!("[Shutdown] fatal: abandoning queued helper work");
            helpers.abort_all();
        }
        while let Some(joined) = helpers.join_next().await {
            if let Err(e) = joined
                && !e.is_cancelled()
            {
                log::warn!("[Shutdown] helper task ended badly: {}", e);
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
