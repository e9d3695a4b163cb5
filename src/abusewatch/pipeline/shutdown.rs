//! Pipeline-wide cancellation
//!
//! A cancel is broadcast to every partition worker. Each worker stops
//! accepting new events, processes what is already queued, flushes final
//! panes for all open windows and exits, exactly as on drain.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use abusewatch::ShutdownCoordinator;
//!
//! # async fn example() {
//! let shutdown = ShutdownCoordinator::new();
//! let on_signal = shutdown.clone();
//! tokio::spawn(async move {
//!     on_signal.wait_for_signal().await;
//! });
//! # }
//! ```

use log::{info, warn};
use std::fmt;
use tokio::sync::broadcast;

/// Why the pipeline is being cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Requested by the embedding application
    Cancel,
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Cancel => write!(f, "cancel"),
            ShutdownSignal::Interrupt => write!(f, "SIGINT (Ctrl+C)"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Broadcasts a cancel to every subscribed partition
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<ShutdownSignal>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.sender.subscribe()
    }

    pub fn trigger(&self, signal: ShutdownSignal) {
        info!("Pipeline shutdown requested: {}", signal);
        if let Err(e) = self.sender.send(signal) {
            warn!("No shutdown listeners registered: {:?}", e);
        }
    }

    pub fn cancel(&self) {
        self.trigger(ShutdownSignal::Cancel);
    }

    /// Wait for SIGINT or SIGTERM and broadcast it
    pub async fn wait_for_signal(&self) {
        let signal = shutdown_signal().await;
        self.trigger(signal);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> ShutdownSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        signal = ctrl_c() => signal,
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> ShutdownSignal {
    ctrl_c().await
}

async fn ctrl_c() -> ShutdownSignal {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    ShutdownSignal::Interrupt
}
