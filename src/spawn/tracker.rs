//! Process-wide active-spawn status.
//!
//! Single writer (the coordinator), many readers (health reporting). The
//! cell is only locked for the instant of a set/clear/read; staleness on the
//! reader side is bounded and harmless, and a health check can never block
//! on an in-flight spawn.

use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct ActiveSpawn {
    pub agent_id: String,
    pub started_at: Instant,
}

/// Shared cell recording whether a spawn is currently in flight.
#[derive(Debug, Clone, Default)]
pub struct ActiveSpawnTracker {
    inner: Arc<RwLock<Option<ActiveSpawn>>>,
}

impl ActiveSpawnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a spawn. Called only by the coordinator, which
    /// holds the spawn lock at that point.
    pub fn set(&self, agent_id: &str) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(ActiveSpawn {
            agent_id: agent_id.to_string(),
            started_at: Instant::now(),
        });
    }

    /// Clear the active spawn. Runs on every coordinator exit path.
    pub fn clear(&self) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    /// Agent id of the spawn currently in flight, if any.
    pub fn active_agent(&self) -> Option<String> {
        let slot = self.inner.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|s| s.agent_id.clone())
    }
}
