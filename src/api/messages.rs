//! Conversation endpoints: history and streamed replies.
//!
//! Replies are relayed to the browser as a UI message stream over SSE.
//! A spawned task drains the agent's stream into a channel; it keeps
//! draining after the browser disconnects so the complete exchange can be
//! persisted once the agent finishes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::ApiError;
use super::guard::OwnedAgent;
use super::routes::AppState;
use crate::chat::{to_display_messages, DisplayMessage, SendMessageRequest};
use crate::config::IdentityMode;
use crate::letta::{AgentStream, AgentStreamEvent, LettaError};
use crate::store::{MessageRole, NewMessage, OwnershipStore};

/// History window fetched from the agent service.
const MESSAGE_LIMIT: usize = 100;
const RELAY_BUFFER: usize = 64;

pub const UI_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/:agent_id/messages", get(list_messages).post(send_message))
}

/// GET /api/agents/:agent_id/messages - Recent conversation in display form.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    OwnedAgent(validated): OwnedAgent,
) -> Result<Json<Vec<DisplayMessage>>, ApiError> {
    let messages = state
        .agents
        .list_messages(&validated.agent_id, MESSAGE_LIMIT)
        .await
        .map_err(|e| ApiError::upstream("Error fetching messages", e))?;

    Ok(Json(to_display_messages(messages)))
}

/// POST /api/agents/:agent_id/messages - Send the latest user message and stream the reply.
async fn send_message(
    State(state): State<Arc<AppState>>,
    OwnedAgent(validated): OwnedAgent,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let text = req
        .latest_user_text()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut upstream = state
        .agents
        .stream_message(&validated.agent_id, &text)
        .await
        .map_err(|e| ApiError::upstream("Error sending message", e))?;

    // Failures before the first event still get a proper status code.
    let first = match upstream.next().await {
        Some(Err(e)) => return Err(ApiError::upstream("Error sending message", e)),
        first => first,
    };

    let exchange = match (state.config.identity_mode, validated.record) {
        (IdentityMode::Cookie, Some(record)) => Some(PendingExchange {
            store: Arc::clone(&state.store),
            agent_row_id: record.id,
            user_text: text,
        }),
        _ => None,
    };

    let (tx, mut rx) = mpsc::channel(RELAY_BUFFER);
    tokio::spawn(relay(validated.agent_id, first, upstream, tx, exchange));

    let events = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok::<_, Infallible>(event);
        }
    };

    Ok((
        [(UI_STREAM_HEADER, "v1")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// UI message stream
// ─────────────────────────────────────────────────────────────────────────────

/// One chunk of the UI message stream protocol.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum UiChunk<'a> {
    Start {
        #[serde(rename = "messageId")]
        message_id: &'a str,
    },
    TextStart {
        id: &'a str,
    },
    TextDelta {
        id: &'a str,
        delta: &'a str,
    },
    TextEnd {
        id: &'a str,
    },
    Error {
        #[serde(rename = "errorText")]
        error_text: &'a str,
    },
    Finish,
}

impl UiChunk<'_> {
    fn event(&self) -> Event {
        Event::default().data(serde_json::to_string(self).unwrap_or_default())
    }
}

/// Forward an event unless the browser has gone away.
async fn emit(tx: &mpsc::Sender<Event>, open: &mut bool, event: Event) {
    if *open && tx.send(event).await.is_err() {
        tracing::debug!("Client disconnected, continuing without forwarding");
        *open = false;
    }
}

/// Relay the agent's reply, then persist the exchange if it completed.
async fn relay(
    agent_id: String,
    first: Option<Result<AgentStreamEvent, LettaError>>,
    mut upstream: AgentStream,
    tx: mpsc::Sender<Event>,
    exchange: Option<PendingExchange>,
) {
    let message_id = format!("msg-{}", Uuid::new_v4());
    let text_id = format!("text-{}", Uuid::new_v4());
    let mut open = true;

    emit(&tx, &mut open, UiChunk::Start { message_id: &message_id }.event()).await;
    emit(&tx, &mut open, UiChunk::TextStart { id: &text_id }.event()).await;

    let mut reply = String::new();
    let mut failure = None;
    let mut next = first;
    while let Some(item) = next {
        match item {
            Ok(AgentStreamEvent::Text(delta)) => {
                emit(
                    &tx,
                    &mut open,
                    UiChunk::TextDelta {
                        id: &text_id,
                        delta: &delta,
                    }
                    .event(),
                )
                .await;
                reply.push_str(&delta);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
        next = upstream.next().await;
    }

    let completed = match failure {
        Some(e) => {
            tracing::error!(agent_id = %agent_id, "Agent stream failed: {}", e);
            let chunk = UiChunk::Error {
                error_text: "Error streaming response",
            };
            emit(&tx, &mut open, chunk.event()).await;
            false
        }
        None => {
            emit(&tx, &mut open, UiChunk::TextEnd { id: &text_id }.event()).await;
            emit(&tx, &mut open, UiChunk::Finish.event()).await;
            true
        }
    };
    emit(&tx, &mut open, Event::default().data("[DONE]")).await;

    // The browser has everything by now; the body closes when `tx` drops.
    match exchange {
        Some(exchange) if completed => exchange.persist(&agent_id, reply).await,
        Some(_) => tracing::warn!(agent_id = %agent_id, "Skipping persistence of failed exchange"),
        None => {}
    }
}

/// A user message waiting for the agent's reply before it is stored.
struct PendingExchange {
    store: Arc<dyn OwnershipStore>,
    agent_row_id: String,
    user_text: String,
}

impl PendingExchange {
    async fn persist(self, agent_id: &str, reply: String) {
        let rows = [
            NewMessage {
                agent_id: self.agent_row_id.clone(),
                letta_message_id: None,
                role: MessageRole::User,
                content: self.user_text,
            },
            NewMessage {
                agent_id: self.agent_row_id,
                letta_message_id: None,
                role: MessageRole::Assistant,
                content: reply,
            },
        ];

        match self.store.create_messages(&rows).await {
            Ok(_) => tracing::info!(agent_id = %agent_id, "Persisted conversation"),
            Err(e) => {
                tracing::error!(agent_id = %agent_id, "Failed to persist messages: {}", e)
            }
        }
    }
}
