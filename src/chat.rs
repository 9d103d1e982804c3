//! Chat payloads exchanged with the browser.
//!
//! Incoming messages use one schema: a UI message with a `parts` list.
//! A bare `content` string is accepted as shorthand for a single text part.
//! Agent history is normalized into the same shape for display.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::letta::LettaMessage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatInputError {
    #[error("messages must not be empty")]
    Empty,

    #[error("the last message must come from the user")]
    NotFromUser,

    #[error("the last message has no text")]
    NoText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    Text {
        text: String,
    },
    /// Files, tool invocations, reasoning and anything else the gateway does not read.
    #[serde(other)]
    Other,
}

/// A message as submitted by the chat UI.
#[derive(Debug, Clone, Deserialize)]
pub struct UiMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: ChatRole,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default)]
    pub content: Option<String>,
}

impl UiMessage {
    /// Concatenated text parts, falling back to `content`.
    pub fn text(&self) -> String {
        let from_parts: String = self
            .parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::Other => None,
            })
            .collect();
        if from_parts.is_empty() {
            self.content.clone().unwrap_or_default()
        } else {
            from_parts
        }
    }
}

/// Body of `POST /api/agents/{agentId}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub messages: Vec<UiMessage>,
}

impl SendMessageRequest {
    /// Text of the newest message, which must be a non-empty user message.
    pub fn latest_user_text(&self) -> Result<String, ChatInputError> {
        let last = self.messages.last().ok_or(ChatInputError::Empty)?;
        if last.role != ChatRole::User {
            return Err(ChatInputError::NotFromUser);
        }
        let text = last.text();
        if text.trim().is_empty() {
            return Err(ChatInputError::NoText);
        }
        Ok(text)
    }
}

/// A history entry in display form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub id: String,
    pub role: ChatRole,
    pub parts: Vec<MessagePart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Letta wraps internal user-side events (heartbeats, login notices, system
/// alerts) as JSON strings inside `user_message`; a packed user message
/// carries its text under `message`.
fn unwrap_user_text(raw: String) -> Option<String> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&raw) else {
        return Some(raw);
    };
    match obj.get("type").and_then(Value::as_str) {
        Some("user_message") => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some(_) => None,
        None => Some(raw),
    }
}

/// Keep the user/assistant exchange and drop reasoning, tool traffic and system events.
pub fn to_display_messages(messages: Vec<LettaMessage>) -> Vec<DisplayMessage> {
    messages
        .into_iter()
        .filter_map(|m| {
            let role = match m.message_type.as_str() {
                "user_message" => ChatRole::User,
                "assistant_message" => ChatRole::Assistant,
                _ => return None,
            };
            let mut text = m.text()?;
            if role == ChatRole::User {
                text = unwrap_user_text(text)?;
            }
            if text.trim().is_empty() {
                return None;
            }
            Some(DisplayMessage {
                id: m.id,
                role,
                parts: vec![MessagePart::Text { text }],
                created_at: m.date,
            })
        })
        .collect()
}
