//! Spawn request validation and normalization.
//!
//! Malformed input is rejected here and never reaches the coordinator.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Identifier grammar shared by spawn and stop: lowercase alphanumerics and
/// hyphen, 2-31 chars, must start with an alphanumeric.
static AGENT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{1,30}$").expect("valid agent id pattern"));

/// Separator joining role and description into the single argument the
/// external spawn executable expects. An external contract; do not change.
pub const ROLE_DESCRIPTION_SEPARATOR: &str = " — ";

/// Raw request body for `POST /spawn-agent`, accepting the field aliases
/// older clients send.
#[derive(Debug, Default, Deserialize)]
pub struct SpawnPayload {
    #[serde(default, alias = "agentId", alias = "name")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "personality")]
    pub description: Option<String>,
    #[serde(
        default,
        alias = "token",
        alias = "discord_token",
        alias = "discordBotToken"
    )]
    pub credential: Option<String>,
    /// Accepted as either a JSON number or a numeric string.
    #[serde(default)]
    pub port: Option<Value>,
}

/// Validated, normalized spawn input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub agent_id: String,
    pub role: String,
    pub description: String,
    pub credential: String,
    /// Empty string when no port was requested.
    pub port: String,
}

impl SpawnRequest {
    /// The role/description argument handed to the spawn executable.
    pub fn full_role(&self) -> String {
        format!(
            "{}{}{}",
            self.role, ROLE_DESCRIPTION_SEPARATOR, self.description
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required fields")]
    MissingFields { missing: Vec<&'static str> },

    #[error("invalid agent_id; use lowercase letters, numbers, hyphen (2-31 chars)")]
    InvalidAgentId,

    #[error("port must be numeric when provided")]
    InvalidPort,
}

/// Check an identifier against the shared agent id grammar.
pub fn is_valid_agent_id(agent_id: &str) -> bool {
    AGENT_ID_RE.is_match(agent_id)
}

/// Validate and normalize a raw spawn payload.
///
/// Normalization trims every field and lowercases the agent id; applying it
/// to an already-normalized request is a no-op.
pub fn normalize(payload: SpawnPayload) -> Result<SpawnRequest, ValidationError> {
    let mut missing = Vec::new();
    if blank(&payload.agent_id) {
        missing.push("agent_id");
    }
    if blank(&payload.role) {
        missing.push("role");
    }
    if blank(&payload.description) {
        missing.push("description");
    }
    if blank(&payload.credential) {
        missing.push("credential");
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { missing });
    }

    let agent_id = payload
        .agent_id
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if !is_valid_agent_id(&agent_id) {
        return Err(ValidationError::InvalidAgentId);
    }

    let port = match payload.port {
        None | Some(Value::Null) => String::new(),
        Some(Value::Number(n)) if n.is_u64() => n.to_string(),
        Some(Value::String(s)) => {
            let s = s.trim().to_string();
            if !s.is_empty() && !s.chars().all(|c| c.is_ascii_digit()) {
                return Err(ValidationError::InvalidPort);
            }
            s
        }
        Some(_) => return Err(ValidationError::InvalidPort),
    };

    Ok(SpawnRequest {
        agent_id,
        role: payload.role.unwrap_or_default().trim().to_string(),
        description: payload.description.unwrap_or_default().trim().to_string(),
        credential: payload.credential.unwrap_or_default().trim().to_string(),
        port,
    })
}

fn blank(field: &Option<String>) -> bool {
    field.as_ref().is_none_or(|s| s.trim().is_empty())
}
