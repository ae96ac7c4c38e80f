//! Bearer token authentication for the control routes.
//!
//! Behavior:
//! - Token configured: requires `Authorization: Bearer <token>` header
//! - Token not configured: only accepts requests from loopback addresses

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::response;
use crate::server::{AppState, RequestId};

/// Check a request against an optional token.
///
/// - If token is `Some`: requires a matching `Authorization: Bearer <token>`
///   header (compared via SHA-256 digests to avoid a timing side channel)
/// - If token is `None`: only allows requests from loopback addresses
pub fn is_authorized(token: &Option<String>, addr: &SocketAddr, headers: &HeaderMap) -> bool {
    match token {
        Some(expected) => headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|provided| {
                let a = Sha256::digest(provided.as_bytes());
                let b = Sha256::digest(expected.as_bytes());
                a == b
            }),
        None => addr.ip().is_loopback(),
    }
}

/// Middleware guarding `/agents`, `/spawn-agent`, and `/stop-agent`.
///
/// Rejections are recorded in the audit log with the request id so failed
/// probes are visible alongside spawn activity.
pub async fn require_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if is_authorized(&state.api_token, &addr, request.headers()) {
        return next.run(request).await;
    }

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone());
    state
        .events
        .append(
            "unauthorized",
            json!({
                "request_id": request_id,
                "path": request.uri().path(),
            }),
        )
        .await;

    response::unauthorized()
}
