//! Row types for the ownership store.

use serde::{Deserialize, Serialize};

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A row of the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbUser {
    pub id: String,
    pub cookie_uid: String,
    pub letta_identity_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub cookie_uid: String,
    pub letta_identity_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A row of the `agents` table: ownership metadata for a Letta agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbAgent {
    pub id: String,
    pub letta_agent_id: String,
    pub user_id: String,
    pub name: String,
    pub persona: Option<String>,
    pub human_block: Option<String>,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAgent {
    pub letta_agent_id: String,
    pub user_id: String,
    pub name: String,
    pub persona: Option<String>,
    pub human_block: Option<String>,
    pub model: String,
}

/// A row of the `messages` table. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbMessage {
    pub id: String,
    /// Store id of the owning agent (not the Letta agent id).
    pub agent_id: String,
    pub letta_message_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub agent_id: String,
    pub letta_message_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
}
