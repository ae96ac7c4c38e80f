//! HTTP request handlers.

mod agents;
mod api_auth;
mod health;
mod spawn;
mod stop;

pub use agents::list_agents;
pub use api_auth::require_token;
pub use health::health;
pub use spawn::spawn_agent;
pub use stop::stop_agent;
