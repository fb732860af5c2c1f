//! Prometheus scrape endpoint.

use std::net::SocketAddr;

use anyhow::Result;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use fedledger_core::render_metrics;
use tokio::net::TcpListener;
use tracing::{error, info};

pub async fn start_metrics_server(port: u16) -> Result<SocketAddr> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "metrics endpoint listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = ?e, "metrics server failed");
        }
    });
    Ok(addr)
}

async fn metrics_handler() -> Response {
    match render_metrics() {
        Ok(Some(body)) => {
            ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
        }
        Ok(None) => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response(),
    }
}
