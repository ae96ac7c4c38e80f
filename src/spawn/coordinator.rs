//! Spawn coordination.
//!
//! Serializes spawns behind the cross-process lock, launches the external
//! spawn executable with bounded output capture and a hard wall-clock
//! timeout, classifies the outcome, and records audit events. Every exit
//! path clears the active-spawn tracker and releases the lock.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::events::EventLog;

use super::lock::SpawnLock;
use super::request::SpawnRequest;
use super::tracker::ActiveSpawnTracker;

/// Bytes of stderr included in audit events for diagnostics.
const EVENT_STDERR_TAIL: usize = 300;

/// Grace period between SIGTERM and SIGKILL when a spawn times out.
const KILL_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// Outcome types
// ============================================================================

/// Result of one spawn attempt.
pub enum SpawnAttempt {
    /// Another spawn currently holds the lock.
    Busy { active: Option<String> },
    /// The coordinator ran the external command to an outcome.
    Finished(SpawnOutcome),
}

pub struct SpawnOutcome {
    pub status: SpawnStatus,
    pub duration_ms: u64,
}

pub enum SpawnStatus {
    /// The external command exited on its own. A non-zero exit code is a
    /// reported condition, not a coordinator fault.
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
        metadata: SpawnMetadata,
    },
    /// The command exceeded the wall-clock deadline and was killed. Output
    /// captured up to that point is still returned.
    TimedOut { stdout: String, stderr: String },
    /// The command could not be launched (missing executable, permissions).
    LaunchFailed { detail: String },
}

/// Structured metadata recovered from the last non-empty line of the spawn
/// command's stdout. Best effort: anything unparseable yields the default.
#[derive(Debug, Clone, Default)]
pub struct SpawnMetadata {
    /// The full parsed object, passed through to the caller.
    pub raw: Value,
    pub guild_configured: bool,
    pub guild_id: Option<Value>,
    pub channel_id: Option<Value>,
}

impl SpawnMetadata {
    /// Parse the last non-empty stdout line as a JSON object.
    pub fn from_stdout(stdout: &str) -> Self {
        let Some(last_line) = stdout.lines().rev().find(|l| !l.trim().is_empty()) else {
            return Self::empty();
        };
        match serde_json::from_str::<Value>(last_line.trim()) {
            Ok(value @ Value::Object(_)) => {
                let guild_configured = value
                    .get("guild_configured")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let guild_id = value.get("guild_id").filter(|v| !v.is_null()).cloned();
                let channel_id = value.get("channel_id").filter(|v| !v.is_null()).cloned();
                Self {
                    raw: value,
                    guild_configured,
                    guild_id,
                    channel_id,
                }
            }
            _ => Self::empty(),
        }
    }

    fn empty() -> Self {
        Self {
            raw: Value::Object(serde_json::Map::new()),
            ..Self::default()
        }
    }
}

// ============================================================================
// SpawnCoordinator
// ============================================================================

pub struct SpawnCoordinator {
    command: PathBuf,
    timeout: Duration,
    output_tail_bytes: usize,
    lock: SpawnLock,
    tracker: ActiveSpawnTracker,
    events: EventLog,
}

impl SpawnCoordinator {
    pub fn new(
        command: PathBuf,
        timeout_seconds: u64,
        output_tail_bytes: usize,
        lock: SpawnLock,
        tracker: ActiveSpawnTracker,
        events: EventLog,
    ) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_seconds),
            output_tail_bytes,
            lock,
            tracker,
            events,
        }
    }

    /// Run one spawn under the lock.
    ///
    /// Non-blocking on contention: a held lock returns `Busy` immediately,
    /// carrying the agent id of the spawn in flight so the caller can say
    /// something useful.
    pub async fn spawn(&self, request: &SpawnRequest, request_id: &str) -> SpawnAttempt {
        let _guard = match self.lock.acquire() {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                return SpawnAttempt::Busy {
                    active: self.tracker.active_agent(),
                };
            }
            Err(e) => {
                // Treat a lock-file fault the same as contention: the spawn
                // is not admitted, and the caller may retry.
                warn!(error = %e, "Spawn lock unavailable");
                return SpawnAttempt::Busy {
                    active: self.tracker.active_agent(),
                };
            }
        };

        self.tracker.set(&request.agent_id);
        self.events
            .append(
                "spawn_start",
                json!({
                    "request_id": request_id,
                    "agent_id": request.agent_id,
                    "role": request.role,
                    "description": request.description,
                    "port": request.port,
                    "credential": request.credential,
                }),
            )
            .await;

        let started = Instant::now();
        let status = self.run_command(request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // Cleared unconditionally before returning, on every branch.
        self.tracker.clear();

        match &status {
            SpawnStatus::Completed {
                exit_code,
                stderr,
                metadata,
                ..
            } => {
                self.events
                    .append(
                        "spawn_done",
                        json!({
                            "request_id": request_id,
                            "agent_id": request.agent_id,
                            "ok": *exit_code == 0,
                            "exit_code": exit_code,
                            "duration_ms": duration_ms,
                            "guild_configured": metadata.guild_configured,
                            "stderr_tail": tail(stderr, EVENT_STDERR_TAIL),
                        }),
                    )
                    .await;
            }
            SpawnStatus::TimedOut { stderr, .. } => {
                self.events
                    .append(
                        "spawn_timeout",
                        json!({
                            "request_id": request_id,
                            "agent_id": request.agent_id,
                            "duration_ms": duration_ms,
                            "stderr_tail": tail(stderr, EVENT_STDERR_TAIL),
                        }),
                    )
                    .await;
            }
            SpawnStatus::LaunchFailed { detail } => {
                self.events
                    .append(
                        "spawn_error",
                        json!({
                            "request_id": request_id,
                            "agent_id": request.agent_id,
                            "error": detail,
                            "duration_ms": duration_ms,
                        }),
                    )
                    .await;
            }
        }

        SpawnAttempt::Finished(SpawnOutcome {
            status,
            duration_ms,
        })
        // _guard drops here, releasing the lock.
    }

    /// Launch the external command and wait for exit or timeout.
    async fn run_command(&self, request: &SpawnRequest) -> SpawnStatus {
        let mut cmd = Command::new(&self.command);
        cmd.arg(&request.agent_id)
            .arg(request.full_role())
            .arg(&request.credential);
        if !request.port.is_empty() {
            cmd.arg(&request.port);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout kill reaches helper processes the
        // command forked. Otherwise an orphaned grandchild keeps the output
        // pipes open and the tail collectors never see EOF.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return SpawnStatus::LaunchFailed {
                    detail: format!("{}: {}", self.command.display(), e),
                };
            }
        };

        // Drain both pipes concurrently into bounded tails so a verbose
        // child can neither fill the pipe nor our memory.
        let cap = self.output_tail_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|r| tokio::spawn(collect_tail(r, cap)));
        let stderr_task = child
            .stderr
            .take()
            .map(|r| tokio::spawn(collect_tail(r, cap)));

        let timed_out = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        debug!(code = ?status.code(), "Spawn command exited");
                        false
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to wait on spawn command");
                        false
                    }
                }
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Spawn command timed out");
                graceful_kill(&mut child).await;
                true
            }
        };

        let stdout = join_tail(stdout_task).await;
        let stderr = join_tail(stderr_task).await;

        if timed_out {
            return SpawnStatus::TimedOut { stdout, stderr };
        }

        // wait() above already reaped the child; a second wait returns the
        // cached status without blocking.
        let exit_code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        };

        let metadata = SpawnMetadata::from_stdout(&stdout);
        SpawnStatus::Completed {
            exit_code,
            stdout,
            stderr,
            metadata,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Read a pipe to EOF, keeping only the trailing `cap` bytes.
async fn collect_tail<R>(mut reader: R, cap: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > cap {
                    let excess = buf.len() - cap;
                    buf.drain(..excess);
                }
            }
            Err(_) => break,
        }
    }
    buf
}

async fn join_tail(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    match task {
        Some(handle) => match handle.await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        },
        None => String::new(),
    }
}

/// Trailing `cap` bytes of a string, snapped to a char boundary.
pub fn tail(s: &str, cap: usize) -> &str {
    if s.len() <= cap {
        return s;
    }
    let mut start = s.len() - cap;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// SIGTERM to the command's process group, wait for the grace period, then
/// SIGKILL. The group id equals the child pid because the command was
/// started with `process_group(0)`.
async fn graceful_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: libc::kill with a pid from Child::id() is safe. The pid
        // comes from the kernel and stays valid while the Child exists.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGTERM);
        }

        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!(pid, "Spawn command ignored SIGTERM, sending SIGKILL");
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }

    let _ = child.kill().await;
    let _ = child.wait().await;
}
