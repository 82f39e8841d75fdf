//! HTTP server for health and metrics endpoints
//!
//! - GET /health  - relay status (JSON)
//! - GET /healthz - liveness
//! - GET /readyz  - ready once a poll has succeeded
//! - GET /metrics - Prometheus metrics

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::metrics;

/// Relay statistics published by the relay loop after every iteration
#[derive(Debug, Default, Clone)]
pub struct RelayerStats {
    pub relayer_id: String,
    /// Last source block fully scanned and relayed
    pub last_processed_block: u64,
    pub processed_nonces: usize,
    /// Latest source head seen
    pub chain_head: Option<u64>,
    pub safe_head: Option<u64>,
    pub consecutive_failures: u32,
    /// Nonce that keeps failing at the head of the batch, with its failure count
    pub stuck_nonce: Option<(String, u32)>,
    pub last_error: Option<String>,
    pub last_successful_poll: Option<DateTime<Utc>>,
    pub dry_run: bool,
}

impl RelayerStats {
    pub fn is_ready(&self) -> bool {
        self.last_successful_poll.is_some()
    }

    pub fn status(&self) -> &'static str {
        if self.consecutive_failures == 0 {
            "healthy"
        } else {
            "degraded"
        }
    }
}

/// Shared state for the HTTP server
pub type SharedStats = Arc<RwLock<RelayerStats>>;

/// Fresh stats handle for a relayer instance
pub fn new_stats(relayer_id: &str, dry_run: bool) -> SharedStats {
    Arc::new(RwLock::new(RelayerStats {
        relayer_id: relayer_id.to_string(),
        dry_run,
        ..Default::default()
    }))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub relayer_id: String,
    pub dry_run: bool,
    pub last_processed_block: u64,
    pub processed_nonces: usize,
    pub chain_head: Option<u64>,
    pub safe_head: Option<u64>,
    pub consecutive_failures: u32,
    pub stuck_nonce: Option<String>,
    pub stuck_nonce_failures: u32,
    pub last_error: Option<String>,
    pub last_successful_poll: Option<DateTime<Utc>>,
}

impl From<&RelayerStats> for HealthResponse {
    fn from(stats: &RelayerStats) -> Self {
        let (stuck_nonce, stuck_nonce_failures) = match &stats.stuck_nonce {
            Some((nonce, count)) => (Some(nonce.clone()), *count),
            None => (None, 0),
        };
        Self {
            status: stats.status().to_string(),
            relayer_id: stats.relayer_id.clone(),
            dry_run: stats.dry_run,
            last_processed_block: stats.last_processed_block,
            processed_nonces: stats.processed_nonces,
            chain_head: stats.chain_head,
            safe_head: stats.safe_head,
            consecutive_failures: stats.consecutive_failures,
            stuck_nonce,
            stuck_nonce_failures,
            last_error: stats.last_error.clone(),
            last_successful_poll: stats.last_successful_poll,
        }
    }
}

async fn health_check(State(stats): State<SharedStats>) -> Json<HealthResponse> {
    let stats = stats.read().await;
    Json(HealthResponse::from(&*stats))
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

async fn readiness(State(stats): State<SharedStats>) -> &'static str {
    if stats.read().await.is_ready() {
        "OK"
    } else {
        "NOT_READY"
    }
}

/// Encode the process-wide registry in the Prometheus text format
pub fn encode_metrics() -> eyre::Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

async fn prometheus_metrics() -> Response {
    let (content_type, buffer) = match encode_metrics() {
        Ok(encoded) => encoded,
        Err(_) => {
            return (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    };

    match Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(stats)
}

/// Start the HTTP server for health and metrics
pub async fn start_server(bind_address: &str, port: u16, stats: SharedStats) -> eyre::Result<()> {
    let app = router(stats);

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Health server listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");

    metrics::UP.set(1.0);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
