//! Unauthenticated liveness surface.
//!
//! Must never block or fail: uptime comes from a process-start instant and
//! the active spawn from the tracker's momentary read, not the spawn lock.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub uptime_seconds: u64,
    pub active_spawn: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_spawn: state.tracker.active_agent(),
    })
}
