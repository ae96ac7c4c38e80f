//! Operator Bridge - a small control plane for spawning and stopping
//! externally-managed agent processes on a single host.

pub mod config;
pub mod events;
pub mod handlers;
pub mod registry;
pub mod response;
pub mod server;
pub mod spawn;
pub mod terminate;
