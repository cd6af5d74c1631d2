//! Signal handling for shutdown (SIGTERM/SIGINT) and reload (SIGHUP).

use tokio::sync::watch;

/// Listens for OS signals and turns them into a shutdown flag or a reload call.
pub struct SignalHandler {
    shutdown_tx: watch::Sender<bool>,
}

impl SignalHandler {
    /// Create a handler and a receiver that flips to `true` on shutdown.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    /// Trigger shutdown without waiting for a signal.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the signal loop until a shutdown signal arrives.
    ///
    /// - SIGTERM / SIGINT / Ctrl+C → shutdown
    /// - SIGHUP (unix only) → `reload_fn`
    pub async fn run<F>(self, reload_fn: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::hangup()),
            ) {
                (Ok(mut sigterm), Ok(mut sighup)) => loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Received SIGINT, initiating shutdown...");
                            break;
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                            break;
                        }
                        _ = sighup.recv() => {
                            tracing::info!("Received SIGHUP, reloading configuration...");
                            reload_fn();
                        }
                    }
                },
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Failed to install unix signal handlers: {e}; Ctrl+C only");
                    wait_ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = &reload_fn;
            wait_ctrl_c().await;
        }

        self.shutdown();
    }
}

async fn wait_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating shutdown..."),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
