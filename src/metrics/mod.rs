//! Metrics Module
//!
//! Handles metrics collection and export.

pub mod collector;
pub mod server;

pub use collector::{Metrics, MetricsSnapshot};
pub use server::MetricsServer;
