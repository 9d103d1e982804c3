//! Ownership store: users, the agents they own, and conversation history.

mod supabase;
mod types;

pub use supabase::SupabaseClient;
pub use types::{DbAgent, DbMessage, DbUser, MessageRole, NewAgent, NewMessage, NewUser};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Supabase request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Supabase returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to decode Supabase response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No {0} returned")]
    Empty(&'static str),
}

/// Relational store for ownership metadata.
///
/// Lookups by a unique column return `Ok(None)` when no row matches.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    // ==================== Users ====================

    async fn create_user(&self, user: &NewUser) -> Result<DbUser, StoreError>;

    async fn get_user_by_cookie_uid(&self, cookie_uid: &str) -> Result<Option<DbUser>, StoreError>;

    async fn get_user_by_identity(
        &self,
        letta_identity_id: &str,
    ) -> Result<Option<DbUser>, StoreError>;

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<DbUser>, StoreError>;

    // ==================== Agents ====================

    async fn create_agent(&self, agent: &NewAgent) -> Result<DbAgent, StoreError>;

    /// Agents owned by `user_id`, newest first.
    async fn list_agents_for_user(&self, user_id: &str) -> Result<Vec<DbAgent>, StoreError>;

    async fn get_agent_by_letta_id(
        &self,
        letta_agent_id: &str,
    ) -> Result<Option<DbAgent>, StoreError>;

    async fn get_agent_by_id(&self, agent_id: &str) -> Result<Option<DbAgent>, StoreError>;

    /// Delete agent metadata; the schema cascades the delete to its messages.
    async fn delete_agent_by_letta_id(&self, letta_agent_id: &str) -> Result<(), StoreError>;

    // ==================== Messages ====================

    async fn create_message(&self, message: &NewMessage) -> Result<DbMessage, StoreError>;

    async fn create_messages(&self, messages: &[NewMessage]) -> Result<Vec<DbMessage>, StoreError>;

    /// Messages of a stored agent, oldest first.
    async fn list_messages_for_agent(&self, agent_id: &str) -> Result<Vec<DbMessage>, StoreError>;

    /// Messages for a Letta agent id; empty when the agent has no metadata row.
    async fn list_messages_for_letta_agent(
        &self,
        letta_agent_id: &str,
    ) -> Result<Vec<DbMessage>, StoreError> {
        match self.get_agent_by_letta_id(letta_agent_id).await? {
            Some(agent) => self.list_messages_for_agent(&agent.id).await,
            None => Ok(Vec::new()),
        }
    }
}
