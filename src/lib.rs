//! # Letta Gateway
//!
//! A multi-tenant HTTP backend in front of a Letta agent server.
//!
//! Each browser is identified by an opaque `letta_uid` cookie. The first
//! request with a new token provisions a Letta identity and a user row in
//! Supabase; agents created afterwards are attached to that identity and
//! recorded as owned by that user. Every per-agent route checks ownership
//! before proxying to Letta.
//!
//! ## Request Flow
//! 1. Identity middleware resolves (or mints) the cookie and bootstraps the user
//! 2. The ownership guard validates the agent for per-agent routes
//! 3. The handler proxies to Letta; replies are streamed back over SSE
//! 4. Completed exchanges are persisted to Supabase
//!
//! ## Modules
//! - `api`: router, middleware, guard and handlers
//! - `letta`: Letta REST client
//! - `store`: Supabase ownership store
//! - `users`: user bootstrap
//! - `chat`: chat payloads and history normalization

pub mod api;
pub mod chat;
pub mod config;
pub mod letta;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;

pub use config::Config;
