//! HTTP exposition of [`PrometheusMetrics`]
//!
//! - `GET /metrics`: Prometheus text format
//! - `GET /health`: `200 OK` while the process is serving

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::PrometheusMetrics;
use crate::error::{Error, Result};

/// A bound listener plus the routes it serves
pub struct MetricsServer {
    listener: TcpListener,
    router: Router,
}

impl MetricsServer {
    /// Bind `addr` now so an unusable address fails at startup
    pub async fn bind(addr: SocketAddr, metrics: Arc<PrometheusMetrics>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::config(format!("Cannot listen for metrics on {addr}: {e}")))?;

        Ok(Self {
            listener,
            router: router(metrics),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `token` is cancelled
    pub async fn serve(self, token: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Serving /metrics and /health");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        info!("Metrics server stopped");
        Ok(())
    }
}

fn router(metrics: Arc<PrometheusMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<PrometheusMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}
