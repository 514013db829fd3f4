//! Liveness endpoint

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::json_response;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    /// Uptime in seconds
    pub uptime: u64,
    pub model_loaded: bool,
    pub active_sessions: usize,
    pub dataset_present: bool,
}

/// GET /health
///
/// Always 200 while the process serves requests; the fields describe
/// component readiness. The dataset is only stat'ed, never read.
pub async fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    let body = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.started_at.elapsed().as_secs(),
        model_loaded: state.models.is_loaded().await,
        active_sessions: state.sessions.len(),
        dataset_present: tokio::fs::metadata(state.models.dataset_path()).await.is_ok(),
    };

    json_response(StatusCode::OK, &body)
}
