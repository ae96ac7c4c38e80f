use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Workspace directory holding registry, logs, and the spawn lock.
    /// Relative paths are resolved against the config file directory.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub spawn: SpawnConfig,
    /// Bearer token for authenticated routes. The `OPERATOR_BRIDGE_TOKEN`
    /// environment variable takes precedence when set. When neither is
    /// present, authenticated routes accept loopback callers only.
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Effective API token: environment variable first, then config file.
    pub fn effective_api_token(&self) -> Option<String> {
        match std::env::var("OPERATOR_BRIDGE_TOKEN") {
            Ok(t) if !t.is_empty() => Some(t),
            _ => self.api_token.clone(),
        }
    }

    /// Resolve the registry, event log, and spawn lock paths, applying
    /// workspace-relative defaults for anything not set explicitly.
    pub fn resolved_paths(&self, config_path: &Path) -> BridgePaths {
        let workspace_raw = self
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE));
        let workspace = resolve_path(config_path, &workspace_raw);

        let resolve_override = |explicit: &Option<PathBuf>, default: &str| match explicit {
            Some(p) => resolve_path(config_path, p),
            None => workspace.join(default),
        };

        BridgePaths {
            registry_file: resolve_override(&self.paths.registry_file, DEFAULT_REGISTRY_FILE),
            event_log: resolve_override(&self.paths.event_log, DEFAULT_EVENT_LOG),
            spawn_lock: resolve_override(&self.paths.spawn_lock, DEFAULT_SPAWN_LOCK),
        }
    }
}

/// Resolve a path relative to the config file directory.
///
/// Absolute paths are returned as-is.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// Default Paths
// ============================================================================

/// Default workspace directory (relative to config file).
pub const DEFAULT_WORKSPACE: &str = ".operator-bridge";
/// Default registry file (relative to workspace). Written by the external
/// spawn executable; only ever read here.
pub const DEFAULT_REGISTRY_FILE: &str = "agents/registry.json";
/// Default audit event log (relative to workspace).
pub const DEFAULT_EVENT_LOG: &str = "logs/events.jsonl";
/// Default spawn lock file (relative to workspace).
pub const DEFAULT_SPAWN_LOCK: &str = "logs/spawn.lock";

/// Fully resolved filesystem paths used by the bridge.
#[derive(Debug, Clone)]
pub struct BridgePaths {
    pub registry_file: PathBuf,
    pub event_log: PathBuf,
    pub spawn_lock: PathBuf,
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout() -> u64 {
    300
}

// ============================================================================
// PathsConfig
// ============================================================================

/// Explicit path overrides. Anything left unset falls back to a
/// workspace-relative default.
#[derive(Debug, Default, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub registry_file: Option<PathBuf>,
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    #[serde(default)]
    pub spawn_lock: Option<PathBuf>,
}

// ============================================================================
// SpawnConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SpawnConfig {
    /// The external agent-creation executable.
    #[serde(default = "default_spawn_command")]
    pub command: PathBuf,
    /// Hard wall-clock timeout for one spawn.
    #[serde(default = "default_spawn_timeout")]
    pub timeout_seconds: u64,
    /// Trailing byte budget for captured stdout/stderr.
    #[serde(default = "default_output_tail_bytes")]
    pub output_tail_bytes: usize,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            command: default_spawn_command(),
            timeout_seconds: default_spawn_timeout(),
            output_tail_bytes: default_output_tail_bytes(),
        }
    }
}

fn default_spawn_command() -> PathBuf {
    PathBuf::from("/usr/local/bin/spawn-agent")
}

fn default_spawn_timeout() -> u64 {
    240
}

fn default_output_tail_bytes() -> usize {
    4000
}

// ============================================================================
// Tests
// ============================================================================
