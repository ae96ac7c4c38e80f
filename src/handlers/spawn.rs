//! POST /spawn-agent.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::json;

use crate::response;
use crate::server::{AppState, RequestId};
use crate::spawn::{SpawnAttempt, SpawnPayload, SpawnStatus, ValidationError, normalize};

pub async fn spawn_agent(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    payload: Result<Json<SpawnPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return response::bad_request(format!("invalid JSON: {rejection}"));
        }
    };

    let request = match normalize(payload) {
        Ok(request) => request,
        Err(e) => {
            // Validation failures never count as spawn attempts, but they
            // are still visible in the audit trail.
            state
                .events
                .append(
                    "spawn_rejected",
                    json!({ "request_id": request_id, "error": e.to_string() }),
                )
                .await;
            return validation_response(&e);
        }
    };

    // The spawn runs on a detached task: if the client disconnects, this
    // handler future is dropped at the await, but the task keeps holding
    // the lock until the external process is done and the tracker cleared.
    let task = {
        let coordinator = state.coordinator.clone();
        let request = request.clone();
        let request_id = request_id.clone();
        tokio::spawn(async move { coordinator.spawn(&request, &request_id).await })
    };

    let attempt = match task.await {
        Ok(attempt) => attempt,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "error": "spawn_exception",
                    "detail": format!("spawn task failed: {e}"),
                    "request_id": request_id,
                })),
            )
                .into_response();
        }
    };

    match attempt {
        SpawnAttempt::Busy { active } => (
            StatusCode::CONFLICT,
            Json(json!({
                "ok": false,
                "error": "spawn_busy",
                "detail": format!(
                    "Another spawn is in progress (agent: {}). Try again shortly.",
                    active.as_deref().unwrap_or("unknown"),
                ),
                "request_id": request_id,
            })),
        )
            .into_response(),

        SpawnAttempt::Finished(outcome) => match outcome.status {
            SpawnStatus::Completed {
                exit_code,
                stdout,
                stderr,
                metadata,
            } => {
                let ok = exit_code == 0;
                let status = if ok {
                    StatusCode::OK
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (
                    status,
                    Json(json!({
                        "ok": ok,
                        "exit_code": exit_code,
                        "stdout": stdout,
                        "stderr": stderr,
                        "request_id": request_id,
                        "duration_ms": outcome.duration_ms,
                        "spawn": metadata.raw,
                        "guild_configured": metadata.guild_configured,
                        "guild_id": metadata.guild_id,
                        "channel_id": metadata.channel_id,
                    })),
                )
                    .into_response()
            }

            SpawnStatus::TimedOut { stdout, stderr } => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "ok": false,
                    "error": "spawn_timeout",
                    "request_id": request_id,
                    "duration_ms": outcome.duration_ms,
                    "stdout": stdout,
                    "stderr": stderr,
                })),
            )
                .into_response(),

            SpawnStatus::LaunchFailed { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "error": "spawn_exception",
                    "detail": detail,
                    "request_id": request_id,
                    "duration_ms": outcome.duration_ms,
                })),
            )
                .into_response(),
        },
    }
}

fn validation_response(error: &ValidationError) -> Response {
    match error {
        ValidationError::MissingFields { missing } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "bad_request",
                "detail": "missing required fields",
                "missing": missing,
            })),
        )
            .into_response(),
        other => response::bad_request(other.to_string()),
    }
}
