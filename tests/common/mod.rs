//! Common test utilities: a bridge instance over loopback backed by a
//! temp workspace and an instrumented fake spawn executable.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;

use operator_bridge::events::EventLog;
use operator_bridge::registry::RegistryReader;
use operator_bridge::server::{self, AppState};
use operator_bridge::spawn::{ActiveSpawnTracker, SpawnCoordinator, SpawnLock};
use operator_bridge::terminate::ProcessTerminator;

pub const TEST_TOKEN: &str = "test-token";

pub struct TestBridge {
    pub base_url: String,
    pub workspace: TempDir,
    client: reqwest::Client,
}

/// Start a bridge with a fake spawn executable.
///
/// Occurrences of `{{WORK}}` in `script_body` are replaced with the
/// workspace path, so scripts can write instrumentation files the test can
/// read back.
pub async fn start_bridge(script_body: &str, spawn_timeout_seconds: u64) -> TestBridge {
    let workspace = TempDir::new().unwrap();
    let work = workspace.path();

    let script_path = work.join("fake-spawn");
    let body = script_body.replace("{{WORK}}", &work.to_string_lossy());
    std::fs::write(&script_path, format!("#!/bin/bash\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script_path, perms).unwrap();

    let events = EventLog::new(work.join("events.jsonl"));
    let registry = RegistryReader::new(work.join("registry.json"));
    let tracker = ActiveSpawnTracker::new();

    let coordinator = Arc::new(SpawnCoordinator::new(
        script_path,
        spawn_timeout_seconds,
        4000,
        SpawnLock::new(work.join("spawn.lock")),
        tracker.clone(),
        events.clone(),
    ));
    let terminator = Arc::new(ProcessTerminator::new(registry.clone(), events.clone()));

    let state = AppState {
        coordinator,
        terminator,
        registry,
        events,
        tracker,
        api_token: Some(TEST_TOKEN.to_string()),
        started_at: Instant::now(),
    };

    let app = server::build_app(state, 30);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestBridge {
        base_url: format!("http://{addr}"),
        workspace,
        client: reqwest::Client::new(),
    }
}

impl TestBridge {
    pub fn path(&self, rel: &str) -> PathBuf {
        self.workspace.path().join(rel)
    }

    pub fn write_registry(&self, contents: &str) {
        std::fs::write(self.path("registry.json"), contents).unwrap();
    }

    pub fn events_raw(&self) -> String {
        std::fs::read_to_string(self.path("events.jsonl")).unwrap_or_default()
    }

    pub async fn get(&self, route: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{route}", self.base_url))
            .bearer_auth(TEST_TOKEN)
            .send()
            .await
            .unwrap()
    }

    pub async fn get_unauthenticated(&self, route: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{route}", self.base_url))
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, route: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{route}", self.base_url))
            .bearer_auth(TEST_TOKEN)
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// POST a raw body with a JSON content type, bypassing serialization.
    pub async fn post_raw(&self, route: &str, body: &'static str) -> reqwest::Response {
        self.client
            .post(format!("{}{route}", self.base_url))
            .bearer_auth(TEST_TOKEN)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn post_with_token(
        &self,
        route: &str,
        body: &serde_json::Value,
        token: &str,
    ) -> reqwest::Response {
        self.client
            .post(format!("{}{route}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .unwrap()
    }
}

/// A well-formed spawn request body.
pub fn spawn_body(agent_id: &str) -> serde_json::Value {
    serde_json::json!({
        "agent_id": agent_id,
        "role": "helper",
        "description": "integration test agent",
        "credential": "hunter2-super-secret",
    })
}
