//! Cooperative shutdown.
//!
//! Ctrl-C and SIGTERM flip a shared flag. The engine checks it between
//! stages and the worker stops taking jobs; nothing in flight is aborted.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Cloneable handle to the process shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// A signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once shutdown is requested.
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in self, so wait_for only fails if it is dropped
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Trigger on Ctrl-C, and on SIGTERM where supported.
    pub fn install_handlers(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            wait_for_termination().await;
            info!("Shutdown requested, finishing current stage");
            signal.trigger();
        });
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}
