//! HTTP API.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Liveness and identity mode
//! - `GET /api/me` - The caller's resolved identity
//! - `GET|POST /api/agents` - List or create the caller's agents
//! - `GET|PATCH|DELETE /api/agents/:agent_id` - Manage an owned agent
//! - `GET /api/agents/:agent_id/history` - Persisted conversation
//! - `GET|POST /api/agents/:agent_id/messages` - Read history or stream a reply

mod agents;
mod error;
mod guard;
mod identity;
mod messages;
mod routes;


pub use error::ApiError;
pub use guard::{validate_owner, OwnedAgent, ValidatedAgent};
pub use identity::{attach_identity, Caller, RequestIdentity, COOKIE_NAME};
pub use routes::{build_router, serve, AppState};
