//! Read-only accessor for the on-disk agent registry.
//!
//! The registry file is a snapshot written by the external spawn executable,
//! mapping agent id to process identity. This service never writes it. An
//! absent file or malformed content is an empty mapping, not an error.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// One registry entry. Unknown keys written by the external executable are
/// carried through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tolerant reader for the registry snapshot.
#[derive(Debug, Clone)]
pub struct RegistryReader {
    path: PathBuf,
}

impl RegistryReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the current snapshot, returning an empty map on any failure.
    pub async fn snapshot(&self) -> HashMap<String, RegistryEntry> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Registry file unreadable, treating as empty");
                return HashMap::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Registry file malformed, treating as empty");
                HashMap::new()
            }
        }
    }

    /// Look up a single agent.
    pub async fn get(&self, agent_id: &str) -> Option<RegistryEntry> {
        self.snapshot().await.remove(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let reader = RegistryReader::new(tmp.path().join("registry.json"));
        assert!(reader.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        std::fs::write(&path, "{not json").unwrap();

        let reader = RegistryReader::new(&path);
        assert!(reader.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn parses_entries_with_extra_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        std::fs::write(
            &path,
            r#"{
                "bot-1": { "pid": 4242, "port": 9001, "started": "2026-08-01" },
                "bot-2": { "port": 9002 }
            }"#,
        )
        .unwrap();

        let reader = RegistryReader::new(&path);
        let snapshot = reader.snapshot().await;
        assert_eq!(snapshot.len(), 2);

        let bot1 = &snapshot["bot-1"];
        assert_eq!(bot1.pid, Some(4242));
        assert_eq!(bot1.port, Some(9001));
        assert_eq!(bot1.extra["started"], "2026-08-01");

        let bot2 = reader.get("bot-2").await.unwrap();
        assert_eq!(bot2.pid, None);
        assert_eq!(bot2.port, Some(9002));
    }

    #[tokio::test]
    async fn get_unknown_agent_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("registry.json");
        std::fs::write(&path, "{}").unwrap();

        let reader = RegistryReader::new(&path);
        assert!(reader.get("bot-9").await.is_none());
    }
}
