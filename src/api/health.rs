//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::dispatch::EngineStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub templates: usize,
    pub engine: EngineStats,
}

/// GET /health - `degraded` while the worker pool is not running
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.engine.stats().await;
    let status = if engine.running { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        templates: state.template_store.count(),
        engine,
    })
}
