//! Spawn coordination subsystem: request validation, the cross-process
//! lock, the active-spawn tracker, and the coordinator itself.

mod coordinator;
mod lock;
mod request;
mod tracker;

pub use coordinator::{
    SpawnAttempt, SpawnCoordinator, SpawnMetadata, SpawnOutcome, SpawnStatus, tail,
};
pub use lock::{SpawnLock, SpawnLockGuard};
pub use request::{
    ROLE_DESCRIPTION_SEPARATOR, SpawnPayload, SpawnRequest, ValidationError, is_valid_agent_id,
    normalize,
};
pub use tracker::{ActiveSpawn, ActiveSpawnTracker};
