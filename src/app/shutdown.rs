//! Graceful Shutdown Handler
//!
//! Turns OS signals into an orderly application stop.

use super::Application;
use crate::lifecycle::Lifecycle;
use std::sync::Arc;
use tokio::signal;

/// Stops an [`Application`] when SIGTERM or Ctrl+C arrives.
///
/// ```rust,ignore
/// let handler = app.shutdown_handler();
/// tokio::spawn(async move {
///     handler.wait_for_shutdown().await;
/// });
/// ```
pub struct ShutdownHandler {
    app: Arc<Application>,
}

impl ShutdownHandler {
    pub fn new(app: Arc<Application>) -> Self {
        Self { app }
    }

    /// Block until a shutdown signal is received, then stop the application
    pub async fn wait_for_shutdown(&self) {
        shutdown_signal().await;
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        tracing::info!("Starting graceful shutdown...");

        if let Err(e) = self.app.lc_stop().await {
            tracing::error!("Error during application shutdown: {}", e);
        }

        tracing::info!("Graceful shutdown complete");
    }
}

/// Completes when Ctrl+C or SIGTERM is received.
///
/// A handler that cannot be installed is logged and never fires.
///
/// ```rust,ignore
/// tokio::select! {
///     _ = shutdown_signal() => {}
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
