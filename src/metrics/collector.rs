//! Metrics Collector

use prometheus::{Counter, Gauge, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Collects and exports relay metrics
pub struct Metrics {
    prometheus_registry: Registry,

    // Prometheus metrics
    messages_forwarded_total: Counter,
    messages_dropped_total: Counter,
    delivery_failures_total: Counter,
    commands_total: Counter,
    active_sessions: Gauge,

    // Internal counters
    forwarded: AtomicU64,
    dropped: AtomicU64,
    delivery_failures: AtomicU64,
    commands: AtomicU64,
}

/// Plain counter values, for logs and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub forwarded: u64,
    pub dropped: u64,
    pub delivery_failures: u64,
    pub commands: u64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let prometheus_registry = Registry::new();

        let messages_forwarded_total = Counter::new(
            "relay_messages_forwarded_total",
            "Messages delivered through a relay webhook"
        ).expect("Failed to create messages_forwarded_total counter");

        let messages_dropped_total = Counter::new(
            "relay_messages_dropped_total",
            "Source messages skipped by the send filter"
        ).expect("Failed to create messages_dropped_total counter");

        let delivery_failures_total = Counter::new(
            "relay_delivery_failures_total",
            "Webhook deliveries that failed"
        ).expect("Failed to create delivery_failures_total counter");

        let commands_total = Counter::new(
            "relay_commands_total",
            "Relay commands handled"
        ).expect("Failed to create commands_total counter");

        let active_sessions = Gauge::new(
            "relay_active_sessions",
            "Number of currently active relays"
        ).expect("Failed to create active_sessions gauge");

        prometheus_registry.register(Box::new(messages_forwarded_total.clone()))
            .expect("Failed to register messages_forwarded_total");
        prometheus_registry.register(Box::new(messages_dropped_total.clone()))
            .expect("Failed to register messages_dropped_total");
        prometheus_registry.register(Box::new(delivery_failures_total.clone()))
            .expect("Failed to register delivery_failures_total");
        prometheus_registry.register(Box::new(commands_total.clone()))
            .expect("Failed to register commands_total");
        prometheus_registry.register(Box::new(active_sessions.clone()))
            .expect("Failed to register active_sessions");

        Self {
            prometheus_registry,
            messages_forwarded_total,
            messages_dropped_total,
            delivery_failures_total,
            commands_total,
            active_sessions,
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            commands: AtomicU64::new(0),
        }
    }

    pub fn record_forwarded(&self) {
        self.messages_forwarded_total.inc();
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.messages_dropped_total.inc();
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures_total.inc();
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_total.inc();
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.active_sessions.set(count as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();
        match encoder.encode_to_string(&metric_families) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
