pub mod dispatch;
pub mod notifier;

pub use dispatch::{DispatchConfig, DispatchLoop, DispatchStats, ItemOutcome, SkipReason};
pub use notifier::{build_notifier, DesktopNotifier, LogNotifier, WebhookNotifier};

use listener_core::CoreError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns the dispatch loop task and its shutdown signal.
pub struct BackgroundService {
    dispatch: Option<DispatchLoop>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<DispatchStats>>,
}

impl BackgroundService {
    pub fn new(dispatch: DispatchLoop) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            dispatch: Some(dispatch),
            shutdown_tx,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn start(&mut self) -> Result<(), CoreError> {
        let dispatch = self.dispatch.take().ok_or_else(|| CoreError::Internal {
            message: "background service already started".to_string(),
        })?;

        let shutdown_rx = self.shutdown_tx.subscribe();
        self.handle = Some(tokio::spawn(dispatch.run(shutdown_rx)));
        info!("Background service started");
        Ok(())
    }

    /// Signals shutdown and waits for the current item to finish.
    pub async fn stop(&mut self) -> Result<DispatchStats, CoreError> {
        let handle = self.handle.take().ok_or_else(|| CoreError::Internal {
            message: "background service is not running".to_string(),
        })?;

        // Errors only when the loop already exited and dropped its receiver.
        let _ = self.shutdown_tx.send(true);

        let stats = handle.await.map_err(|e| CoreError::Internal {
            message: format!("dispatch task failed: {}", e),
        })?;
        info!("Background service stopped");
        Ok(stats)
    }
}
