//! Graceful shutdown on SIGINT/SIGTERM.
//!
//! When the signal arrives every registered build is cancelled, then the
//! shutdown token is cancelled so the HTTP server stops accepting requests and
//! `main` returns normally.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cancel::CancelRegistry;

/// Ties the termination signal to build cancellation and server shutdown.
#[derive(Debug, Clone)]
pub struct SignalCoordinator {
    registry: Arc<CancelRegistry>,
    shutdown: CancellationToken,
}

impl SignalCoordinator {
    pub fn new(registry: Arc<CancelRegistry>) -> Self {
        SignalCoordinator {
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelled once shutdown has started; pass it to the server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Waits for `signal`, cancels every registered build and then the
    /// shutdown token. Returns the number of builds signalled.
    pub async fn run(&self, signal: impl Future<Output = ()>) -> usize {
        signal.await;
        let cancelled = self.registry.cancel_all();
        info!(cancelled, "Shutting down");
        self.shutdown.cancel();
        cancelled
    }
}

/// Resolves on the first SIGINT or SIGTERM.
///
/// Handlers are installed before this returns, so a signal delivered while
/// the returned future is pending is not lost.
#[cfg(unix)]
pub fn termination_signal() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    })
}

/// Resolves on the first Ctrl+C.
#[cfg(not(unix))]
pub fn termination_signal() -> io::Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
    })
}
