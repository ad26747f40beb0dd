//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on a separate tokio task and serves `/metrics` for scraping plus a
//! `/healthz` liveness probe.

use axum::{routing::get, Router};
use std::net::SocketAddr;

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn healthz() -> &'static str {
    "ok"
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "metrics HTTP server listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind metrics HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "metrics HTTP server error");
    }
}
