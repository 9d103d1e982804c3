//! Agent management API endpoints.
//!
//! - List the caller's agents
//! - Create an agent from the default template
//! - Get, update and delete an owned agent
//! - Read the conversation history persisted for an agent

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::guard::OwnedAgent;
use super::identity::Caller;
use super::messages;
use super::routes::AppState;
use crate::config::IdentityMode;
use crate::letta::{sort_by_recent_update, CreateAgent, LettaAgent, MemoryBlock};
use crate::store::{DbMessage, NewAgent};

const DEFAULT_AGENT_NAME: &str = "New Agent";

/// Create agent routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_agents).post(create_agent))
        .route(
            "/:agent_id",
            get(get_agent).patch(update_agent).delete(delete_agent),
        )
        .route("/:agent_id/history", get(get_history))
        .merge(messages::routes())
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateAgentRequest {
    #[serde(default)]
    pub name: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/agents - List the caller's agents, most recently updated first.
async fn list_agents(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<LettaAgent>>, ApiError> {
    // Agents are attached to identities; the identity key is the client token.
    let identifier_keys = match state.config.identity_mode {
        IdentityMode::Cookie => vec![caller.client_token],
        IdentityMode::SingleTenant => Vec::new(),
    };

    let mut agents = state
        .agents
        .list_agents(&identifier_keys)
        .await
        .map_err(|e| ApiError::upstream("Error fetching agents", e))?;
    sort_by_recent_update(&mut agents);

    Ok(Json(agents))
}

/// POST /api/agents - Create an agent from the default template.
async fn create_agent(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    body: Option<Json<CreateAgentRequest>>,
) -> Result<Json<LettaAgent>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let template = &state.config.agent_template;
    let cookie_mode = state.config.identity_mode == IdentityMode::Cookie;

    let request = CreateAgent {
        name: req.name.filter(|n| !n.trim().is_empty()),
        memory_blocks: template
            .memory_blocks
            .iter()
            .map(|b| MemoryBlock {
                label: b.label.clone(),
                value: b.value.clone(),
            })
            .collect(),
        model: template.model.clone(),
        embedding: template.embedding.clone(),
        identity_ids: if cookie_mode {
            vec![caller.identity_id.clone()]
        } else {
            Vec::new()
        },
    };

    let agent = state
        .agents
        .create_agent(&request)
        .await
        .map_err(|e| ApiError::upstream("Error creating agent", e))?;

    if cookie_mode {
        let metadata = NewAgent {
            letta_agent_id: agent.id.clone(),
            user_id: caller.store_user_id.clone(),
            name: agent
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_string()),
            persona: template.block("persona").map(str::to_string),
            human_block: template.block("human").map(str::to_string),
            model: template.model.clone(),
        };
        if let Err(e) = state.store.create_agent(&metadata).await {
            tracing::error!(
                agent_id = %agent.id,
                user_id = %caller.store_user_id,
                "Agent created without ownership metadata: {}",
                e
            );
            return Err(ApiError::Upstream("Error creating agent"));
        }
    }

    tracing::info!(agent_id = %agent.id, "Created agent");
    Ok(Json(agent))
}

/// GET /api/agents/:agent_id - Get agent details.
async fn get_agent(OwnedAgent(validated): OwnedAgent) -> Json<LettaAgent> {
    Json(validated.agent)
}

/// PATCH /api/agents/:agent_id - Apply a partial update.
async fn update_agent(
    State(state): State<Arc<AppState>>,
    OwnedAgent(validated): OwnedAgent,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<LettaAgent>, ApiError> {
    let Json(patch) = body?;
    if !patch.is_object() {
        return Err(ApiError::BadRequest(
            "Update must be a JSON object".to_string(),
        ));
    }

    let updated = state
        .agents
        .modify_agent(&validated.agent_id, &patch)
        .await
        .map_err(|e| ApiError::upstream("Error updating agent", e))?
        .ok_or(ApiError::NotFound("Agent"))?;

    tracing::info!(agent_id = %validated.agent_id, "Updated agent");
    Ok(Json(updated))
}

/// DELETE /api/agents/:agent_id - Delete the agent and its metadata.
///
/// The two deletes are not atomic; a failure in the second leaves the
/// metadata row behind and is logged for reconciliation.
async fn delete_agent(
    State(state): State<Arc<AppState>>,
    OwnedAgent(validated): OwnedAgent,
) -> Result<Json<Value>, ApiError> {
    let agent_id = &validated.agent_id;

    state
        .agents
        .delete_agent(agent_id)
        .await
        .map_err(|e| ApiError::upstream("Error deleting agent", e))?;

    if state.config.identity_mode == IdentityMode::Cookie {
        if let Err(e) = state.store.delete_agent_by_letta_id(agent_id).await {
            tracing::error!(
                agent_id = %agent_id,
                "Agent deleted but its metadata remains: {}",
                e
            );
            return Err(ApiError::Upstream("Error deleting agent"));
        }
    }

    tracing::info!(agent_id = %agent_id, "Deleted agent and metadata");
    Ok(Json(json!({ "message": "Agent deleted successfully" })))
}

/// GET /api/agents/:agent_id/history - Messages persisted for the agent, oldest first.
async fn get_history(
    State(state): State<Arc<AppState>>,
    OwnedAgent(validated): OwnedAgent,
) -> Result<Json<Vec<DbMessage>>, ApiError> {
    let messages = match &validated.record {
        Some(record) => state.store.list_messages_for_agent(&record.id).await,
        None => {
            state
                .store
                .list_messages_for_letta_agent(&validated.agent_id)
                .await
        }
    }
    .map_err(|e| ApiError::upstream("Error fetching history", e))?;

    Ok(Json(messages))
}
