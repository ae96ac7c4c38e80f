//! Append-only JSONL audit trail.
//!
//! One JSON record per line. Appends are fire-and-forget: a full disk or a
//! permission problem must never fail the request that triggered the event,
//! so write errors are logged and swallowed.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Marker substituted for credential values before a record is written.
pub const REDACTED: &str = "***redacted***";

/// Field names whose values are always redacted, on every code path.
const SECRET_FIELDS: &[&str] = &["credential", "token", "discord_token"];

/// Fire-and-forget writer for the audit event log.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Append one event record.
    ///
    /// `fields` must be a JSON object; its entries are carried through
    /// verbatim except credential fields, which are replaced with the
    /// redaction marker. The record always carries a UTC timestamp at
    /// second precision and the event kind.
    pub async fn append(&self, event: &str, fields: Value) {
        let mut record = Map::new();
        record.insert(
            "ts".to_string(),
            Value::String(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        );
        record.insert("event".to_string(), Value::String(event.to_string()));

        if let Value::Object(fields) = fields {
            for (key, value) in fields {
                record.insert(key.clone(), redact(&key, value));
            }
        }

        let mut line = match serde_json::to_string(&Value::Object(record)) {
            Ok(s) => s,
            Err(e) => {
                warn!(event, error = %e, "Failed to serialize event record");
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.write_line(&line).await {
            warn!(event, path = %self.path.display(), error = %e, "Failed to append event record");
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        // The tokio File buffers internally; without the flush the record
        // may not be on disk when append returns.
        file.flush().await
    }
}

fn redact(key: &str, value: Value) -> Value {
    if SECRET_FIELDS.contains(&key) {
        Value::String(REDACTED.to_string())
    } else {
        value
    }
}
