use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use ulid::Ulid;

use crate::events::EventLog;
use crate::handlers;
use crate::registry::RegistryReader;
use crate::response;
use crate::spawn::{ActiveSpawnTracker, SpawnCoordinator};
use crate::terminate::ProcessTerminator;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SpawnCoordinator>,
    pub terminator: Arc<ProcessTerminator>,
    pub registry: RegistryReader,
    pub events: EventLog,
    pub tracker: ActiveSpawnTracker,
    pub api_token: Option<String>,
    pub started_at: Instant,
}

// ============================================================================
// Request Correlation
// ============================================================================

/// Correlation id carried from middleware to handlers and into the audit
/// log, one per inbound request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub fn new_request_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

async fn assign_request_id(mut request: Request<Body>, next: Next) -> Response {
    request
        .extensions_mut()
        .insert(RequestId(new_request_id()));
    next.run(request).await
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    // The spawn route is bounded by the coordinator's own timeout, which may
    // exceed the request timeout; it is exempt from the timeout layer the
    // same way long-lived routes are elsewhere.
    let spawn_route = Router::new()
        .route("/spawn-agent", post(handlers::spawn_agent))
        .with_state(state.clone());

    let quick_routes = Router::new()
        .route("/agents", get(handlers::list_agents))
        .route("/stop-agent", post(handlers::stop_agent))
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let guarded = Router::new()
        .merge(spawn_route)
        .merge(quick_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_token,
        ))
        .layer(middleware::from_fn(assign_request_id));

    // Browser frontends call the bridge cross-origin; the CORS layer sits
    // outermost so preflights are answered before auth and every response,
    // including rejections, carries the allow headers.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .with_state(state)
        .merge(guarded)
        .fallback(|| async { response::not_found("no such route") })
        .layer(cors)
}
