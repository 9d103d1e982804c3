//! Ownership guard for `/api/agents/:agent_id` routes.
//!
//! Ownership mismatch and absence both reject with the same 404, so callers
//! cannot discover agents that belong to someone else.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

use super::error::ApiError;
use super::identity::{RequestIdentity, DEFAULT_IDENTITY};
use super::routes::AppState;
use crate::config::IdentityMode;
use crate::letta::{AgentService, LettaAgent};
use crate::store::{DbAgent, OwnershipStore};

/// An agent the caller is allowed to act on.
#[derive(Debug, Clone)]
pub struct ValidatedAgent {
    pub user_id: String,
    pub agent_id: String,
    pub agent: LettaAgent,
    /// Ownership row; `None` in single-tenant mode, where the store is not consulted.
    pub record: Option<DbAgent>,
}

/// Check that `agent_id` exists and belongs to `identity`.
pub async fn validate_owner(
    mode: IdentityMode,
    agents: &dyn AgentService,
    store: &dyn OwnershipStore,
    identity: Option<&RequestIdentity>,
    agent_id: &str,
) -> Result<ValidatedAgent, ApiError> {
    if mode == IdentityMode::SingleTenant {
        let agent = fetch_agent(agents, agent_id).await?;
        return Ok(ValidatedAgent {
            user_id: DEFAULT_IDENTITY.to_string(),
            agent_id: agent_id.to_string(),
            agent,
            record: None,
        });
    }

    let identity = identity.ok_or(ApiError::Unauthorized)?;

    if agent_id.is_empty() {
        return Err(ApiError::BadRequest("Agent ID is required".to_string()));
    }

    let agent = fetch_agent(agents, agent_id).await?;

    let record = store
        .get_agent_by_letta_id(agent_id)
        .await
        .map_err(|e| ApiError::upstream("Error fetching agent", e))?;

    match record {
        Some(record) if record.user_id == identity.store_user_id => Ok(ValidatedAgent {
            user_id: identity.store_user_id.clone(),
            agent_id: agent_id.to_string(),
            agent,
            record: Some(record),
        }),
        Some(_) => {
            tracing::debug!(agent_id = %agent_id, "Agent owned by another user");
            Err(ApiError::NotFound("Agent"))
        }
        None => {
            tracing::debug!(agent_id = %agent_id, "Agent has no ownership metadata");
            Err(ApiError::NotFound("Agent"))
        }
    }
}

async fn fetch_agent(agents: &dyn AgentService, agent_id: &str) -> Result<LettaAgent, ApiError> {
    agents
        .get_agent(agent_id)
        .await
        .map_err(|e| ApiError::upstream("Error fetching agent", e))?
        .ok_or(ApiError::NotFound("Agent"))
}

/// Extractor running [`validate_owner`] on the `agent_id` path parameter.
#[derive(Debug, Clone)]
pub struct OwnedAgent(pub ValidatedAgent);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OwnedAgent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Path(agent_id) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::BadRequest("Agent ID is required".to_string()))?;

        let validated = validate_owner(
            state.config.identity_mode,
            state.agents.as_ref(),
            state.store.as_ref(),
            parts.extensions.get::<RequestIdentity>(),
            &agent_id,
        )
        .await?;

        Ok(OwnedAgent(validated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLetta, MemoryStore};
    use axum::http::StatusCode;

    fn caller(user_id: &str) -> RequestIdentity {
        RequestIdentity {
            store_user_id: user_id.to_string(),
            identity_id: format!("identity-of-{}", user_id),
            client_token: format!("token-of-{}", user_id),
        }
    }

    #[tokio::test]
    async fn test_owner_is_accepted() {
        let letta = FakeLetta::new();
        let store = MemoryStore::new();
        letta.insert_agent("agent-a", None, &[]);
        let row = store.insert_agent("agent-a", "user-1");

        let validated = validate_owner(
            IdentityMode::Cookie,
            &letta,
            &store,
            Some(&caller("user-1")),
            "agent-a",
        )
        .await
        .unwrap();

        assert_eq!(validated.user_id, "user-1");
        assert_eq!(validated.agent_id, "agent-a");
        assert_eq!(validated.agent.id, "agent-a");
        assert_eq!(validated.record, Some(row));
    }

    #[tokio::test]
    async fn test_foreign_and_missing_agents_are_indistinguishable() {
        let letta = FakeLetta::new();
        let store = MemoryStore::new();
        letta.insert_agent("agent-b", None, &[]);
        store.insert_agent("agent-b", "user-2");
        letta.insert_agent("agent-orphan", None, &[]);

        let me = caller("user-1");
        let foreign = validate_owner(IdentityMode::Cookie, &letta, &store, Some(&me), "agent-b")
            .await
            .unwrap_err();
        let absent = validate_owner(IdentityMode::Cookie, &letta, &store, Some(&me), "agent-zzz")
            .await
            .unwrap_err();
        let orphan =
            validate_owner(IdentityMode::Cookie, &letta, &store, Some(&me), "agent-orphan")
                .await
                .unwrap_err();

        for err in [&foreign, &absent, &orphan] {
            assert_eq!(err.status(), StatusCode::NOT_FOUND);
            assert_eq!(err.to_string(), "Agent not found");
        }
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let letta = FakeLetta::new();
        let store = MemoryStore::new();
        letta.insert_agent("agent-a", None, &[]);

        let err = validate_owner(IdentityMode::Cookie, &letta, &store, None, "agent-a")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_agent_id_is_bad_request() {
        let letta = FakeLetta::new();
        let store = MemoryStore::new();

        let err = validate_owner(IdentityMode::Cookie, &letta, &store, Some(&caller("u")), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_single_tenant_skips_the_store() {
        let letta = FakeLetta::new();
        let store = MemoryStore::new();
        letta.insert_agent("agent-a", None, &[]);
        store.insert_agent("agent-a", "someone-else");

        let validated =
            validate_owner(IdentityMode::SingleTenant, &letta, &store, None, "agent-a")
                .await
                .unwrap();
        assert_eq!(validated.user_id, DEFAULT_IDENTITY);
        assert!(validated.record.is_none());

        let err = validate_owner(IdentityMode::SingleTenant, &letta, &store, None, "agent-x")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failures_are_500() {
        let letta = FakeLetta::new();
        let store = MemoryStore::new();
        letta.insert_agent("agent-a", None, &[]);
        store.insert_agent("agent-a", "user-1");
        let me = caller("user-1");

        letta.fail("get_agent");
        let err = validate_owner(IdentityMode::Cookie, &letta, &store, Some(&me), "agent-a")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        letta.recover("get_agent");
        store.fail("get_agent_by_letta_id");
        let err = validate_owner(IdentityMode::Cookie, &letta, &store, Some(&me), "agent-a")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
