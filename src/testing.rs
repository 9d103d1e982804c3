//! In-memory stand-ins for the agent service and the ownership store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use crate::letta::{
    AgentService, AgentStream, AgentStreamEvent, CreateAgent, CreateIdentity, IdentityDirectory,
    LettaAgent, LettaError, LettaIdentity, LettaMessage, UpdateIdentity,
};
use crate::store::{
    DbAgent, DbMessage, DbUser, NewAgent, NewMessage, NewUser, OwnershipStore, StoreError,
};

fn injected_letta(op: &str) -> LettaError {
    LettaError::Status {
        status: reqwest::StatusCode::BAD_GATEWAY,
        body: format!("injected failure: {}", op),
    }
}

fn injected_store(op: &str) -> StoreError {
    StoreError::Status {
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        body: format!("injected failure: {}", op),
    }
}

#[derive(Default)]
struct LettaState {
    identities: Vec<LettaIdentity>,
    agents: Vec<(LettaAgent, Vec<String>)>,
    messages: HashMap<String, Vec<LettaMessage>>,
    reply: Vec<String>,
    submitted: Vec<(String, String)>,
    deleted: Vec<String>,
    failing: HashSet<String>,
    identity_list_calls: usize,
    next_id: usize,
}

/// Fake Letta server: identities, agents, histories and a scripted streamed reply.
pub struct FakeLetta {
    state: Mutex<LettaState>,
}

impl FakeLetta {
    pub fn new() -> Self {
        let state = LettaState {
            reply: vec!["Hello".to_string(), ", world".to_string()],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make the named operation fail until [`Self::recover`] is called.
    pub fn fail(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.state.lock().unwrap().failing.remove(op);
    }

    fn check(&self, op: &str) -> Result<(), LettaError> {
        if self.state.lock().unwrap().failing.contains(op) {
            return Err(injected_letta(op));
        }
        Ok(())
    }

    pub fn identities(&self) -> Vec<LettaIdentity> {
        self.state.lock().unwrap().identities.clone()
    }

    pub fn identity_list_calls(&self) -> usize {
        self.state.lock().unwrap().identity_list_calls
    }

    pub fn agent_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.agents.iter().map(|(a, _)| a.id.clone()).collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Messages submitted through `stream_message`, as `(agent_id, text)`.
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn set_reply(&self, chunks: &[&str]) {
        self.state.lock().unwrap().reply = chunks.iter().map(|c| c.to_string()).collect();
    }

    /// Register an agent directly, attached to the given identity ids.
    pub fn insert_agent(&self, id: &str, updated_at: Option<&str>, identity_ids: &[&str]) {
        let agent = LettaAgent {
            id: id.to_string(),
            name: Some(format!("agent {}", id)),
            updated_at: updated_at.map(str::to_string),
            extra: Map::new(),
        };
        let ids = identity_ids.iter().map(|s| s.to_string()).collect();
        self.state.lock().unwrap().agents.push((agent, ids));
    }

    pub fn set_messages(&self, agent_id: &str, messages: Value) {
        let messages: Vec<LettaMessage> = serde_json::from_value(messages).unwrap();
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(agent_id.to_string(), messages);
    }
}

#[async_trait]
impl IdentityDirectory for FakeLetta {
    async fn list_identities(&self) -> Result<Vec<LettaIdentity>, LettaError> {
        self.check("list_identities")?;
        let mut state = self.state.lock().unwrap();
        state.identity_list_calls += 1;
        Ok(state.identities.clone())
    }

    async fn get_identity(&self, identity_id: &str) -> Result<Option<LettaIdentity>, LettaError> {
        self.check("get_identity")?;
        let state = self.state.lock().unwrap();
        Ok(state.identities.iter().find(|i| i.id == identity_id).cloned())
    }

    async fn create_identity(&self, request: &CreateIdentity) -> Result<LettaIdentity, LettaError> {
        self.check("create_identity")?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let identity = LettaIdentity {
            id: format!("identity-{}", state.next_id),
            identifier_key: request.identifier_key.clone(),
            name: Some(request.name.clone()),
            identity_type: request.identity_type,
            agent_ids: Vec::new(),
        };
        state.identities.push(identity.clone());
        Ok(identity)
    }

    async fn update_identity(
        &self,
        identity_id: &str,
        update: &UpdateIdentity,
    ) -> Result<Option<LettaIdentity>, LettaError> {
        self.check("update_identity")?;
        let mut state = self.state.lock().unwrap();
        let Some(identity) = state.identities.iter_mut().find(|i| i.id == identity_id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            identity.name = Some(name.clone());
        }
        if let Some(agent_ids) = &update.agent_ids {
            identity.agent_ids = agent_ids.clone();
        }
        Ok(Some(identity.clone()))
    }
}

#[async_trait]
impl AgentService for FakeLetta {
    async fn list_agents(&self, identifier_keys: &[String]) -> Result<Vec<LettaAgent>, LettaError> {
        self.check("list_agents")?;
        let state = self.state.lock().unwrap();
        let allowed: HashSet<&str> = state
            .identities
            .iter()
            .filter(|i| identifier_keys.contains(&i.identifier_key))
            .map(|i| i.id.as_str())
            .collect();
        Ok(state
            .agents
            .iter()
            .filter(|(_, ids)| {
                identifier_keys.is_empty() || ids.iter().any(|id| allowed.contains(id.as_str()))
            })
            .map(|(a, _)| a.clone())
            .collect())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<LettaAgent>, LettaError> {
        self.check("get_agent")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .iter()
            .find(|(a, _)| a.id == agent_id)
            .map(|(a, _)| a.clone()))
    }

    async fn create_agent(&self, request: &CreateAgent) -> Result<LettaAgent, LettaError> {
        self.check("create_agent")?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut extra = Map::new();
        extra.insert("model".to_string(), json!(request.model));
        extra.insert("embedding".to_string(), json!(request.embedding));
        extra.insert(
            "memory_blocks".to_string(),
            serde_json::to_value(&request.memory_blocks).unwrap(),
        );
        let agent = LettaAgent {
            id: format!("agent-{}", state.next_id),
            name: request.name.clone(),
            updated_at: Some("2025-01-01T00:00:00Z".to_string()),
            extra,
        };
        state
            .agents
            .push((agent.clone(), request.identity_ids.clone()));
        Ok(agent)
    }

    async fn modify_agent(
        &self,
        agent_id: &str,
        patch: &Value,
    ) -> Result<Option<LettaAgent>, LettaError> {
        self.check("modify_agent")?;
        let mut state = self.state.lock().unwrap();
        let Some((agent, _)) = state.agents.iter_mut().find(|(a, _)| a.id == agent_id) else {
            return Ok(None);
        };
        if let Some(fields) = patch.as_object() {
            for (key, value) in fields {
                if key == "name" {
                    agent.name = value.as_str().map(str::to_string);
                } else {
                    agent.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(Some(agent.clone()))
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), LettaError> {
        self.check("delete_agent")?;
        let mut state = self.state.lock().unwrap();
        state.agents.retain(|(a, _)| a.id != agent_id);
        state.deleted.push(agent_id.to_string());
        Ok(())
    }

    async fn list_messages(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<LettaMessage>, LettaError> {
        self.check("list_messages")?;
        let state = self.state.lock().unwrap();
        let messages = state.messages.get(agent_id).cloned().unwrap_or_default();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn stream_message(&self, agent_id: &str, text: &str) -> Result<AgentStream, LettaError> {
        self.check("stream_message")?;
        let fail_midway = self.check("stream_midway").is_err();
        let mut state = self.state.lock().unwrap();
        state
            .submitted
            .push((agent_id.to_string(), text.to_string()));

        let mut events: Vec<Result<AgentStreamEvent, LettaError>> = state
            .reply
            .iter()
            .map(|chunk| Ok(AgentStreamEvent::Text(chunk.clone())))
            .collect();
        if fail_midway {
            events.push(Err(LettaError::Stream("connection reset".to_string())));
        }
        Ok(futures::stream::iter(events).boxed())
    }
}

#[derive(Default)]
struct StoreState {
    users: Vec<DbUser>,
    agents: Vec<DbAgent>,
    messages: Vec<DbMessage>,
    calls: Vec<String>,
    failing: HashSet<String>,
    next_id: usize,
}

/// Fake ownership store that records every call it receives.
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn fail(&self, op: &str) {
        self.state.lock().unwrap().failing.insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.state.lock().unwrap().failing.remove(op);
    }

    /// Record the call and return the injected failure, if any.
    fn enter(&self, op: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op.to_string());
        if state.failing.contains(op) {
            return Err(injected_store(op));
        }
        Ok(())
    }

    pub fn users(&self) -> Vec<DbUser> {
        self.state.lock().unwrap().users.clone()
    }

    pub fn agents(&self) -> Vec<DbAgent> {
        self.state.lock().unwrap().agents.clone()
    }

    pub fn messages(&self) -> Vec<DbMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Insert ownership metadata for an agent directly.
    pub fn insert_agent(&self, letta_agent_id: &str, user_id: &str) -> DbAgent {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let agent = DbAgent {
            id: format!("row-{}", state.next_id),
            letta_agent_id: letta_agent_id.to_string(),
            user_id: user_id.to_string(),
            name: "seeded".to_string(),
            persona: None,
            human_block: None,
            model: "letta/letta-free".to_string(),
            created_at: timestamp(state.next_id),
            updated_at: timestamp(state.next_id),
        };
        state.agents.push(agent.clone());
        agent
    }
}

fn timestamp(seq: usize) -> String {
    format!("2025-01-01T00:00:{:02}Z", seq % 60)
}

#[async_trait]
impl OwnershipStore for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<DbUser, StoreError> {
        self.enter("create_user")?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let row = DbUser {
            id: format!("user-{}", state.next_id),
            cookie_uid: user.cookie_uid.clone(),
            letta_identity_id: user.letta_identity_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            created_at: timestamp(state.next_id),
            updated_at: timestamp(state.next_id),
        };
        state.users.push(row.clone());
        Ok(row)
    }

    async fn get_user_by_cookie_uid(&self, cookie_uid: &str) -> Result<Option<DbUser>, StoreError> {
        self.enter("get_user_by_cookie_uid")?;
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.cookie_uid == cookie_uid).cloned())
    }

    async fn get_user_by_identity(
        &self,
        letta_identity_id: &str,
    ) -> Result<Option<DbUser>, StoreError> {
        self.enter("get_user_by_identity")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .find(|u| u.letta_identity_id == letta_identity_id)
            .cloned())
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<DbUser>, StoreError> {
        self.enter("get_user_by_id")?;
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn create_agent(&self, agent: &NewAgent) -> Result<DbAgent, StoreError> {
        self.enter("create_agent")?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let row = DbAgent {
            id: format!("row-{}", state.next_id),
            letta_agent_id: agent.letta_agent_id.clone(),
            user_id: agent.user_id.clone(),
            name: agent.name.clone(),
            persona: agent.persona.clone(),
            human_block: agent.human_block.clone(),
            model: agent.model.clone(),
            created_at: timestamp(state.next_id),
            updated_at: timestamp(state.next_id),
        };
        state.agents.push(row.clone());
        Ok(row)
    }

    async fn list_agents_for_user(&self, user_id: &str) -> Result<Vec<DbAgent>, StoreError> {
        self.enter("list_agents_for_user")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_agent_by_letta_id(
        &self,
        letta_agent_id: &str,
    ) -> Result<Option<DbAgent>, StoreError> {
        self.enter("get_agent_by_letta_id")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .iter()
            .find(|a| a.letta_agent_id == letta_agent_id)
            .cloned())
    }

    async fn get_agent_by_id(&self, agent_id: &str) -> Result<Option<DbAgent>, StoreError> {
        self.enter("get_agent_by_id")?;
        let state = self.state.lock().unwrap();
        Ok(state.agents.iter().find(|a| a.id == agent_id).cloned())
    }

    async fn delete_agent_by_letta_id(&self, letta_agent_id: &str) -> Result<(), StoreError> {
        self.enter("delete_agent_by_letta_id")?;
        let mut state = self.state.lock().unwrap();
        let removed: Vec<String> = state
            .agents
            .iter()
            .filter(|a| a.letta_agent_id == letta_agent_id)
            .map(|a| a.id.clone())
            .collect();
        state.agents.retain(|a| a.letta_agent_id != letta_agent_id);
        state.messages.retain(|m| !removed.contains(&m.agent_id));
        Ok(())
    }

    async fn create_message(&self, message: &NewMessage) -> Result<DbMessage, StoreError> {
        self.enter("create_message")?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let row = DbMessage {
            id: format!("message-{}", state.next_id),
            agent_id: message.agent_id.clone(),
            letta_message_id: message.letta_message_id.clone(),
            role: message.role,
            content: message.content.clone(),
            created_at: timestamp(state.next_id),
        };
        state.messages.push(row.clone());
        Ok(row)
    }

    async fn create_messages(&self, messages: &[NewMessage]) -> Result<Vec<DbMessage>, StoreError> {
        self.enter("create_messages")?;
        let mut state = self.state.lock().unwrap();
        let mut rows = Vec::with_capacity(messages.len());
        for message in messages {
            state.next_id += 1;
            let row = DbMessage {
                id: format!("message-{}", state.next_id),
                agent_id: message.agent_id.clone(),
                letta_message_id: message.letta_message_id.clone(),
                role: message.role,
                content: message.content.clone(),
                created_at: timestamp(state.next_id),
            };
            state.messages.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn list_messages_for_agent(&self, agent_id: &str) -> Result<Vec<DbMessage>, StoreError> {
        self.enter("list_messages_for_agent")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.agent_id == agent_id)
            .cloned()
            .collect())
    }
}
