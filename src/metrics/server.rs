//! Metrics HTTP Server
//!
//! Provides HTTP endpoint for Prometheus metrics scraping

use crate::metrics::Metrics;
use crate::Result;
use anyhow::Context;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// HTTP server for serving Prometheus metrics
pub struct MetricsServer {
    metrics: Arc<Metrics>,
    bind_addr: SocketAddr,
}

impl MetricsServer {
    /// Create a new metrics server
    pub fn new(metrics: Arc<Metrics>, bind_addr: SocketAddr) -> Self {
        Self { metrics, bind_addr }
    }

    /// Build the router serving `/metrics` and `/health`
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(Arc::clone(&self.metrics))
    }

    /// Start the metrics server
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind metrics server to {}", self.bind_addr))?;

        info!(bind_addr = %self.bind_addr, "Metrics server started");

        if let Err(e) = axum::serve(listener, self.router()).await {
            error!(error = %e, "Metrics server error");
            return Err(e.into());
        }

        Ok(())
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics.export_prometheus(),
    )
}

async fn health_handler() -> &'static str {
    "OK"
}
