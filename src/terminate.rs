//! Agent termination with a PID-first, port-fallback strategy.
//!
//! The recorded PID can be stale (the agent restarted under a new PID bound
//! to the same port), so when signaling fails or no PID is recorded we fall
//! back to killing whatever currently listens on the agent's TCP port.
//! Neither path re-verifies process death: "stopped" means a kill was
//! issued, a deliberate best-effort contract.

use std::time::Duration;

use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::events::EventLog;
use crate::registry::RegistryReader;

/// Timeout for the port-scan kill command.
const PORT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a stop request.
pub enum StopOutcome {
    /// The agent exists in the registry. `stopped` is false when the entry
    /// held neither a signalable PID nor a port - a reportable state, not
    /// an error.
    Stopped {
        agent_id: String,
        pid: Option<u32>,
        port: Option<u16>,
        stopped: bool,
    },
    /// The agent is not in the registry.
    NotFound,
}

pub struct ProcessTerminator {
    registry: RegistryReader,
    events: EventLog,
}

impl ProcessTerminator {
    pub fn new(registry: RegistryReader, events: EventLog) -> Self {
        Self { registry, events }
    }

    /// Stop a named agent. The caller validates the id grammar; an id that
    /// reaches this point is well-formed.
    pub async fn stop(&self, agent_id: &str, request_id: &str) -> StopOutcome {
        let Some(entry) = self.registry.get(agent_id).await else {
            return StopOutcome::NotFound;
        };

        let pid = entry.pid;
        let port = entry.port;
        let mut stopped = false;

        if let Some(pid) = pid {
            stopped = signal_terminate(pid);
            if !stopped {
                debug!(agent_id, pid, "PID signal failed, trying port fallback");
            }
        }

        if !stopped {
            if let Some(port) = port {
                stopped = kill_by_port(port).await;
            }
        }

        self.events
            .append(
                "agent_stopped",
                json!({
                    "request_id": request_id,
                    "agent_id": agent_id,
                    "pid": pid,
                    "port": port,
                    "stopped": stopped,
                }),
            )
            .await;

        StopOutcome::Stopped {
            agent_id: agent_id.to_string(),
            pid,
            port,
            stopped,
        }
    }
}

/// Send SIGTERM to a PID. Signaling success counts as stopped even though
/// actual exit is not re-verified.
fn signal_terminate(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // The registry is external input. pid 0 would signal our own
        // process group, and anything above i32::MAX wraps to a negative
        // pid_t (-1 signals every process the user owns).
        if pid == 0 || pid > i32::MAX as u32 {
            warn!(pid, "Registry pid out of range, not signaling");
            return false;
        }
        // SAFETY: libc::kill with SIGTERM is a standard POSIX call; a dead
        // or recycled pid yields an error return, never UB.
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        result == 0
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Kill any process bound to the given local TCP port.
///
/// Finding no such process is not an error; the command is wrapped so it
/// always exits cleanly.
async fn kill_by_port(port: u16) -> bool {
    let script = format!("lsof -ti tcp:{port} | xargs -r kill 2>/dev/null || true");
    let run = Command::new("bash").args(["-c", &script]).output();

    match tokio::time::timeout(PORT_KILL_TIMEOUT, run).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(port, error = %e, "Port-scan kill failed to launch");
            false
        }
        Err(_) => {
            warn!(port, "Port-scan kill timed out");
            false
        }
    }
}
