//! Shutdown coordination for graceful termination

use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ShutdownController {
    tx: Mutex<broadcast::Sender<()>>,
    shutdown_triggered: Mutex<bool>,
}

impl ShutdownController {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(1);
        Arc::new(Self {
            tx: Mutex::new(tx),
            shutdown_triggered: Mutex::new(false),
        })
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        let tx = self.tx.lock().await;
        tx.subscribe()
    }

    pub async fn trigger_shutdown(&self, reason: &str) {
        let mut triggered = self.shutdown_triggered.lock().await;
        if *triggered {
            debug!(
                log_type = "supervisor",
                "Shutdown already in progress, ignoring additional request"
            );
            return;
        }

        info!(log_type = "supervisor", "Initiating shutdown: {}", reason);
        *triggered = true;

        let tx = self.tx.lock().await;
        let _ = tx.send(());
    }

    pub async fn is_shutdown_triggered(&self) -> bool {
        let triggered = self.shutdown_triggered.lock().await;
        *triggered
    }

    /// Resolves once shutdown was triggered, including before this call.
    pub async fn wait(&self) {
        let mut rx = self.subscribe().await;
        if self.is_shutdown_triggered().await {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Triggers shutdown on SIGINT, SIGTERM or SIGQUIT (Ctrl+C on Windows).
    pub async fn listen_for_signals(self: Arc<Self>) {
        match wait_for_signal().await {
            Ok(signal) => self.trigger_shutdown(signal).await,
            Err(e) => {
                warn!(
                    log_type = "supervisor",
                    "Failed to install signal handlers: {}", e
                );
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "received SIGINT",
        _ = sigterm.recv() => "received SIGTERM",
        _ = sigquit.recv() => "received SIGQUIT",
    };

    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("received Ctrl+C")
}
