//! POST /stop-agent.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use crate::response;
use crate::server::{AppState, RequestId};
use crate::spawn::is_valid_agent_id;
use crate::terminate::StopOutcome;

#[derive(Debug, Default, Deserialize)]
pub struct StopPayload {
    #[serde(default, alias = "agentId", alias = "name")]
    pub agent_id: Option<String>,
}

pub async fn stop_agent(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    payload: Result<Json<StopPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return response::bad_request(format!("invalid JSON: {rejection}"));
        }
    };

    let agent_id = payload
        .agent_id
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if !is_valid_agent_id(&agent_id) {
        return response::bad_request("invalid or missing agent_id");
    }

    match state.terminator.stop(&agent_id, &request_id).await {
        StopOutcome::NotFound => {
            response::not_found(format!("agent '{agent_id}' not in registry"))
        }
        StopOutcome::Stopped {
            agent_id, stopped, ..
        } => (
            StatusCode::OK,
            Json(json!({ "ok": true, "agent_id": agent_id, "stopped": stopped })),
        )
            .into_response(),
    }
}
