//! Relay Session

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Stop flag a listener polls between messages
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Owning handle to a running message listener.
///
/// Stopping is idempotent, and dropping the handle stops the listener.
/// The listener sees the raised [`StopSignal`] before it handles any message
/// received after `stop` returns; the task is also aborted. Deliveries
/// already spawned by the listener keep running.
#[derive(Debug)]
pub struct ListenerHandle {
    signal: StopSignal,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Spawn a listener task that is handed its stop signal
    pub fn spawn<F, Fut>(listener: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signal = StopSignal::default();
        let task = tokio::spawn(listener(signal.clone()));
        Self { signal, task }
    }

    /// Stop the listener. Returns `true` only for the call that stopped it.
    pub fn stop(&self) -> bool {
        if !self.signal.raise() {
            return false;
        }
        self.task.abort();
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_raised()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Activity counters shared between a session and its listener
#[derive(Debug)]
pub struct SessionActivity {
    last_activity_ms: AtomicU64,
    messages_relayed: AtomicU64,
}

impl SessionActivity {
    pub fn new() -> Self {
        Self {
            last_activity_ms: AtomicU64::new(now_millis()),
            messages_relayed: AtomicU64::new(0),
        }
    }

    /// Record a successful delivery
    pub fn record_delivery(&self) {
        self.last_activity_ms.store(now_millis(), Ordering::Relaxed);
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed))
    }

    pub fn messages_relayed(&self) -> u64 {
        self.messages_relayed.load(Ordering::Relaxed)
    }
}

impl Default for SessionActivity {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Represents an active relay into one target channel
#[derive(Debug)]
pub struct RelaySession {
    pub source_channel_id: String,
    pub target_channel_id: String,
    pub webhook_id: String,
    pub start_time: SystemTime,
    activity: Arc<SessionActivity>,
    listener: ListenerHandle,
}

/// Point-in-time view of a relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStats {
    pub source_channel_id: String,
    pub target_channel_id: String,
    pub webhook_id: String,
    pub start_time: SystemTime,
    pub last_activity: SystemTime,
    pub messages_relayed: u64,
}

impl RelaySession {
    pub fn new(
        source_channel_id: String,
        target_channel_id: String,
        webhook_id: String,
        activity: Arc<SessionActivity>,
        listener: ListenerHandle,
    ) -> Self {
        debug!(
            "Creating relay session: {} -> {} via webhook {}",
            source_channel_id, target_channel_id, webhook_id
        );

        Self {
            source_channel_id,
            target_channel_id,
            webhook_id,
            start_time: SystemTime::now(),
            activity,
            listener,
        }
    }

    pub fn last_activity(&self) -> SystemTime {
        self.activity.last_activity()
    }

    pub fn messages_relayed(&self) -> u64 {
        self.activity.messages_relayed()
    }

    /// Detach the listener; safe to call more than once
    pub fn stop(&self) -> bool {
        self.listener.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.listener.is_stopped()
    }

    pub fn to_stats(&self) -> RelayStats {
        RelayStats {
            source_channel_id: self.source_channel_id.clone(),
            target_channel_id: self.target_channel_id.clone(),
            webhook_id: self.webhook_id.clone(),
            start_time: self.start_time,
            last_activity: self.last_activity(),
            messages_relayed: self.messages_relayed(),
        }
    }

    /// Log session statistics
    pub fn log_stats(&self) {
        let duration = self.start_time.elapsed().unwrap_or_default();
        info!(
            source_channel = %self.source_channel_id,
            target_channel = %self.target_channel_id,
            webhook_id = %self.webhook_id,
            duration_ms = duration.as_millis() as u64,
            messages_relayed = self.messages_relayed(),
            "Relay session completed"
        );
    }
}
