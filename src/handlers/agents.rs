use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::registry::RegistryEntry;
use crate::server::AppState;

#[derive(Serialize)]
pub struct AgentsResponse {
    pub ok: bool,
    pub agents: HashMap<String, RegistryEntry>,
}

/// GET /agents - the registry snapshot as the external executable wrote it.
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        ok: true,
        agents: state.registry.snapshot().await,
    })
}
