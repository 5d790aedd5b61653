//! SIGINT/SIGTERM handling for the watch loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Cancellation flag shared between the signal listener and a loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled on the first SIGINT or SIGTERM.
    ///
    /// Must be called from within a tokio runtime. If no handler can be
    /// registered the token is still returned but never fires.
    pub fn listen() -> Self {
        let token = Self::new();
        let listener = token.clone();

        tokio::spawn(async move {
            let sigint = signal(SignalKind::interrupt())
                .map_err(|e| warn!("Failed to register SIGINT handler: {}", e))
                .ok();
            let sigterm = signal(SignalKind::terminate())
                .map_err(|e| warn!("Failed to register SIGTERM handler: {}", e))
                .ok();

            let name = match (sigint, sigterm) {
                (Some(mut int), Some(mut term)) => tokio::select! {
                    _ = int.recv() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                },
                (Some(mut int), None) => {
                    int.recv().await;
                    "SIGINT"
                }
                (None, Some(mut term)) => {
                    term.recv().await;
                    "SIGTERM"
                }
                (None, None) => {
                    warn!("No signal handlers registered, graceful shutdown disabled");
                    return;
                }
            };
            info!("Received {}, stopping", name);
            listener.cancel();
        });

        token
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}
