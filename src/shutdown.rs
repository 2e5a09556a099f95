//! Graceful Shutdown Handling
//!
//! This module provides utilities for handling graceful shutdown of the relay bot.
//! It supports SIGTERM and SIGINT signals and ensures active relays are stopped cleanly.

use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::signal;
use tracing::{info, warn, error, debug};
use crate::relay::RelayController;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Shutdown timeout duration
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast shutdown to every subscriber
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!("No components listening for shutdown: {}", e);
        }
    }

    /// Wait for SIGTERM, SIGINT or Ctrl+C, then broadcast shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal: {}", e);
        }

        Ok(())
    }

    /// Stop every active relay.
    ///
    /// Listener tasks are aborted right away; deliveries already in flight
    /// get a short grace period bounded by the shutdown timeout.
    pub async fn shutdown_relays(&self, controller: &RelayController) -> Result<()> {
        info!("Initiating graceful shutdown of active relays");
        let start_time = Instant::now();

        let stopped = controller.teardown();
        if stopped > 0 {
            let grace = self.timeout.min(Duration::from_secs(2));
            debug!("Waiting {:?} for in-flight deliveries", grace);
            tokio::time::sleep(grace).await;
        }

        info!("Stopped {} relay(s) in {:?}", stopped, start_time.elapsed());
        Ok(())
    }
}

/// Shutdown-aware task handle that can be gracefully cancelled
pub struct ShutdownAwareTask {
    handle: tokio::task::JoinHandle<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ShutdownAwareTask {
    /// Create a new shutdown-aware task
    pub fn spawn<F, Fut>(
        shutdown_coordinator: &ShutdownCoordinator,
        task_name: &str,
        task_fn: F,
    ) -> Self
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let shutdown_rx = shutdown_coordinator.subscribe();
        let task_name = task_name.to_string();

        let handle = tokio::spawn(async move {
            debug!("Starting shutdown-aware task: {}", task_name);
            task_fn(shutdown_rx).await;
            debug!("Shutdown-aware task completed: {}", task_name);
        });

        Self {
            handle,
            shutdown_rx: shutdown_coordinator.subscribe(),
        }
    }

    /// Wait for the task to complete or shutdown signal
    pub async fn wait_for_completion_or_shutdown(mut self) -> Result<()> {
        tokio::select! {
            result = &mut self.handle => {
                match result {
                    Ok(()) => {
                        debug!("Task completed successfully");
                        Ok(())
                    }
                    Err(e) if e.is_cancelled() => {
                        debug!("Task was cancelled");
                        Ok(())
                    }
                    Err(e) => {
                        error!("Task failed: {}", e);
                        Err(anyhow::anyhow!("Task failed: {}", e))
                    }
                }
            }
            _ = self.shutdown_rx.recv() => {
                debug!("Received shutdown signal, cancelling task");
                self.handle.abort();
                Ok(())
            }
        }
    }
}
