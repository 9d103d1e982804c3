//! Letta agent service: agents, their messages, and the identity directory.
//!
//! Two traits split the service along the lines the rest of the crate uses
//! it. [`LettaClient`] implements both over the REST API.

mod client;
mod error;
mod stream;
mod types;

pub use client::LettaClient;
pub use error::LettaError;
pub use stream::{parse_stream_data, StreamData};
pub use types::{
    content_text, sort_by_recent_update, AgentStreamEvent, CreateAgent, CreateIdentity,
    IdentityType, LettaAgent, LettaIdentity, LettaMessage, MemoryBlock, UpdateIdentity,
};

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Streamed reply to a submitted message.
pub type AgentStream = BoxStream<'static, Result<AgentStreamEvent, LettaError>>;

/// The remote directory of identities, keyed by an opaque identifier.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn list_identities(&self) -> Result<Vec<LettaIdentity>, LettaError>;

    /// Returns `None` when the directory has no identity with this id.
    async fn get_identity(&self, identity_id: &str) -> Result<Option<LettaIdentity>, LettaError>;

    async fn create_identity(&self, request: &CreateIdentity) -> Result<LettaIdentity, LettaError>;

    /// Returns `None` when the directory has no identity with this id.
    async fn update_identity(
        &self,
        identity_id: &str,
        update: &UpdateIdentity,
    ) -> Result<Option<LettaIdentity>, LettaError>;

    /// Find an identity by identifier key.
    ///
    /// The directory has no keyed lookup, so this scans the full list.
    async fn find_identity_by_key(
        &self,
        identifier_key: &str,
    ) -> Result<Option<LettaIdentity>, LettaError> {
        let identities = self.list_identities().await?;
        Ok(identities
            .into_iter()
            .find(|i| i.identifier_key == identifier_key))
    }

    /// Reuse the identity for `identifier_key` or create a `user` identity for it.
    async fn get_or_create_identity(
        &self,
        identifier_key: &str,
        name: &str,
    ) -> Result<LettaIdentity, LettaError> {
        if let Some(existing) = self.find_identity_by_key(identifier_key).await? {
            tracing::info!(identity_id = %existing.id, "Found existing Letta identity");
            return Ok(existing);
        }

        let identity = self
            .create_identity(&CreateIdentity {
                identifier_key: identifier_key.to_string(),
                name: name.to_string(),
                identity_type: IdentityType::User,
            })
            .await?;
        tracing::info!(identity_id = %identity.id, "Created Letta identity");
        Ok(identity)
    }

    /// Add `agent_id` to the identity's attached agents, keeping the others.
    ///
    /// Returns `None` when the identity does not exist.
    async fn attach_identity_to_agent(
        &self,
        identity_id: &str,
        agent_id: &str,
    ) -> Result<Option<LettaIdentity>, LettaError> {
        let Some(identity) = self.get_identity(identity_id).await? else {
            return Ok(None);
        };
        if identity.agent_ids.iter().any(|id| id == agent_id) {
            return Ok(Some(identity));
        }

        let mut agent_ids = identity.agent_ids;
        agent_ids.push(agent_id.to_string());
        let update = UpdateIdentity {
            agent_ids: Some(agent_ids),
            ..Default::default()
        };
        let updated = self.update_identity(identity_id, &update).await?;
        tracing::info!(identity_id = %identity_id, agent_id = %agent_id, "Attached identity to agent");
        Ok(updated)
    }
}

/// Agent lifecycle and conversation operations.
#[async_trait]
pub trait AgentService: Send + Sync {
    /// List agents, restricted to those attached to any of `identifier_keys` when non-empty.
    async fn list_agents(&self, identifier_keys: &[String]) -> Result<Vec<LettaAgent>, LettaError>;

    /// Returns `None` when the service reports the agent as missing.
    async fn get_agent(&self, agent_id: &str) -> Result<Option<LettaAgent>, LettaError>;

    async fn create_agent(&self, request: &CreateAgent) -> Result<LettaAgent, LettaError>;

    /// Apply a partial update. Returns `None` when the agent is missing.
    async fn modify_agent(
        &self,
        agent_id: &str,
        patch: &serde_json::Value,
    ) -> Result<Option<LettaAgent>, LettaError>;

    async fn delete_agent(&self, agent_id: &str) -> Result<(), LettaError>;

    /// Most recent messages, oldest first.
    async fn list_messages(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<LettaMessage>, LettaError>;

    /// Submit a user message and stream the agent's reply.
    async fn stream_message(&self, agent_id: &str, text: &str) -> Result<AgentStream, LettaError>;
}
