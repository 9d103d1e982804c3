//! Letta REST client.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder};
use reqwest_eventsource::{Event, EventSource};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::stream::{parse_stream_data, StreamData};
use super::{
    AgentService, AgentStream, AgentStreamEvent, CreateAgent, CreateIdentity, IdentityDirectory,
    LettaAgent, LettaError, LettaIdentity, LettaMessage, UpdateIdentity,
};

/// Client for a Letta server (self-hosted or cloud).
#[derive(Clone)]
pub struct LettaClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LettaClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/v1/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    fn agent_path(agent_id: &str) -> String {
        format!("agents/{}", urlencoding::encode(agent_id))
    }

    /// Send a request and decode a successful JSON body.
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, LettaError> {
        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(LettaError::Status { status, body: text });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Like [`Self::send_json`], mapping 404 to `None`.
    async fn send_optional<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<T>, LettaError> {
        match self.send_json(builder).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityDirectory for LettaClient {
    async fn list_identities(&self) -> Result<Vec<LettaIdentity>, LettaError> {
        self.send_json(self.request(Method::GET, "identities/")).await
    }

    async fn get_identity(&self, identity_id: &str) -> Result<Option<LettaIdentity>, LettaError> {
        let path = format!("identities/{}", urlencoding::encode(identity_id));
        self.send_optional(self.request(Method::GET, &path)).await
    }

    async fn create_identity(&self, request: &CreateIdentity) -> Result<LettaIdentity, LettaError> {
        self.send_json(self.request(Method::POST, "identities/").json(request))
            .await
    }

    async fn update_identity(
        &self,
        identity_id: &str,
        update: &UpdateIdentity,
    ) -> Result<Option<LettaIdentity>, LettaError> {
        let path = format!("identities/{}", urlencoding::encode(identity_id));
        self.send_optional(self.request(Method::PATCH, &path).json(update))
            .await
    }
}

#[async_trait]
impl AgentService for LettaClient {
    async fn list_agents(&self, identifier_keys: &[String]) -> Result<Vec<LettaAgent>, LettaError> {
        let query: Vec<(&str, &str)> = identifier_keys
            .iter()
            .map(|k| ("identifier_keys", k.as_str()))
            .collect();
        self.send_json(self.request(Method::GET, "agents/").query(&query))
            .await
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<LettaAgent>, LettaError> {
        self.send_optional(self.request(Method::GET, &Self::agent_path(agent_id)))
            .await
    }

    async fn create_agent(&self, request: &CreateAgent) -> Result<LettaAgent, LettaError> {
        self.send_json(self.request(Method::POST, "agents/").json(request))
            .await
    }

    async fn modify_agent(
        &self,
        agent_id: &str,
        patch: &serde_json::Value,
    ) -> Result<Option<LettaAgent>, LettaError> {
        self.send_optional(
            self.request(Method::PATCH, &Self::agent_path(agent_id))
                .json(patch),
        )
        .await
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), LettaError> {
        let resp = self
            .request(Method::DELETE, &Self::agent_path(agent_id))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LettaError::Status { status, body });
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<LettaMessage>, LettaError> {
        let path = format!("{}/messages", Self::agent_path(agent_id));
        self.send_json(
            self.request(Method::GET, &path)
                .query(&[("limit", limit.to_string())]),
        )
        .await
    }

    async fn stream_message(&self, agent_id: &str, text: &str) -> Result<AgentStream, LettaError> {
        let path = format!("{}/messages/stream", Self::agent_path(agent_id));
        let builder = self
            .request(Method::POST, &path)
            .header("Accept", "text/event-stream")
            .json(&json!({
                "messages": [{ "role": "user", "content": text }],
                "stream_tokens": true
            }));

        let mut source = EventSource::new(builder)
            .map_err(|e| LettaError::Stream(format!("Failed to open event stream: {}", e)))?;
        // A retry would submit the message a second time.
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        let stream = async_stream::try_stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => match parse_stream_data(&message.data) {
                        StreamData::Text(text) => {
                            yield AgentStreamEvent::Text(text);
                        }
                        StreamData::Done => break,
                        StreamData::Error(reason) => {
                            source.close();
                            Err::<(), _>(LettaError::Stream(reason))?;
                        }
                        StreamData::Ignored => {}
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, resp)) => {
                        source.close();
                        let body = resp.text().await.unwrap_or_default();
                        Err::<(), _>(LettaError::Status { status, body })?;
                    }
                    Err(e) => {
                        source.close();
                        Err::<(), _>(LettaError::Stream(e.to_string()))?;
                    }
                }
            }
            source.close();
        };

        Ok(stream.boxed())
    }
}

impl std::fmt::Debug for LettaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LettaClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
