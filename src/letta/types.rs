//! Wire types for the Letta REST API.
//!
//! Agent and message payloads keep every field the service sends in a
//! flattened map, so they can be handed back to the browser unchanged.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of principal an identity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    User,
    Agent,
    System,
}

/// An identity record in the Letta identity directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LettaIdentity {
    pub id: String,
    pub identifier_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_identity_type")]
    pub identity_type: IdentityType,
    #[serde(default)]
    pub agent_ids: Vec<String>,
}

fn default_identity_type() -> IdentityType {
    IdentityType::User
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIdentity {
    pub identifier_key: String,
    pub name: String,
    pub identity_type: IdentityType,
}

/// Partial identity update; unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replaces the full list of attached agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_ids: Option<Vec<String>>,
}

/// An agent as returned by the agent service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LettaAgent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LettaAgent {
    /// Parse `updated_at`, accepting RFC 3339 and the zone-less form Letta sometimes emits.
    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.updated_at.as_deref()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Sort agents most recently updated first; agents without a timestamp go last.
pub fn sort_by_recent_update(agents: &mut [LettaAgent]) {
    agents.sort_by(|a, b| b.updated_at_utc().cmp(&a.updated_at_utc()));
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryBlock {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAgent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub memory_blocks: Vec<MemoryBlock>,
    pub model: String,
    pub embedding: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identity_ids: Vec<String>,
}

/// One entry of an agent's message history.
///
/// Letta returns a tagged union keyed on `message_type`; only the fields
/// needed for display are typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LettaMessage {
    pub id: String,
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LettaMessage {
    /// Text content: either a plain string or the concatenated text parts.
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().and_then(content_text)
    }
}

/// Extract text from a Letta `content` value (string or list of text parts).
pub fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            Some(text)
        }
        _ => None,
    }
}

/// An event decoded from the agent's streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStreamEvent {
    /// A piece of the assistant's reply.
    Text(String),
}
