//! Admin/JSON-RPC API (C9): a thin `axum` façade over the swap store (reads)
//! and the pipeline's admin operations (writes), following the teacher's
//! `canceler::server` convention of one `AppState`, one `Router`, and plain
//! `async fn` handlers returning `impl IntoResponse`.

mod admin;
mod rpc;

use crate::metrics::Metrics;
use crate::pipeline::Relayer;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub relayer: Arc<Relayer>,
    pub metrics: Arc<Metrics>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse { status: "ok" })
}

async fn metrics_handler(axum::extract::State(state): axum::extract::State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
            .into_response();
    }
    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to build response")
            .into_response(),
    }
}

#[derive(Serialize)]
struct StatusResponse {
    pending_not_stable: i64,
    pending_big_value: i64,
    pending_match_not_stable: i64,
}

async fn status_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<StatusResponse> {
    let pending_not_stable = state
        .relayer
        .store
        .count_with_status(crate::types::Status::TxNotStable)
        .await
        .unwrap_or(-1);
    let pending_big_value = state
        .relayer
        .store
        .count_with_status(crate::types::Status::TxWithBigValue)
        .await
        .unwrap_or(-1);
    let pending_match_not_stable = state
        .relayer
        .store
        .count_with_status(crate::types::Status::MatchTxNotStable)
        .await
        .unwrap_or(-1);

    axum::Json(StatusResponse {
        pending_not_stable,
        pending_big_value,
        pending_match_not_stable,
    })
}

/// Serve the API on `bind_address:port` until `shutdown` fires (§6).
pub async fn start_server(
    bind_address: &str,
    port: u16,
    relayer: Arc<Relayer>,
    metrics: Arc<Metrics>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> eyre::Result<()> {
    let state = AppState { relayer, metrics };

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc::handle_rpc))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!(%addr, "admin API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
