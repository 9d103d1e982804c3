//! Supabase client for the PostgREST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    DbAgent, DbMessage, DbUser, NewAgent, NewMessage, NewUser, OwnershipStore, StoreError,
};

/// Supabase client for ownership tables.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    url: String,
    api_key: String,
}

impl SupabaseClient {
    /// Create a new Supabase client.
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Get the PostgREST URL for a table, with an optional query string.
    fn table_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/rest/v1/{}", self.url, table)
        } else {
            format!("{}/rest/v1/{}?{}", self.url, table, query)
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// `column=eq.value` with the value escaped.
    fn eq(column: &str, value: &str) -> String {
        format!("{}=eq.{}", column, urlencoding::encode(value))
    }

    /// Fetch rows matching a query.
    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>, StoreError> {
        let resp = self
            .authed(self.client.get(self.table_url(table, query)))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(StoreError::Status { status, body: text });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Fetch the single row matching a unique filter.
    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &str,
    ) -> Result<Option<T>, StoreError> {
        let rows: Vec<T> = self
            .select(table, &format!("select=*&{}&limit=1", filter))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Insert rows and return their stored representation.
    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<Vec<T>, StoreError> {
        let resp = self
            .authed(self.client.post(self.table_url(table, "")))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(StoreError::Status { status, body: text });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl OwnershipStore for SupabaseClient {
    // ==================== Users ====================

    async fn create_user(&self, user: &NewUser) -> Result<DbUser, StoreError> {
        let rows: Vec<DbUser> = self.insert("users", std::slice::from_ref(user)).await?;
        let created = rows.into_iter().next().ok_or(StoreError::Empty("user"))?;
        tracing::info!(user_id = %created.id, "Created user in Supabase");
        Ok(created)
    }

    async fn get_user_by_cookie_uid(&self, cookie_uid: &str) -> Result<Option<DbUser>, StoreError> {
        self.select_one("users", &Self::eq("cookie_uid", cookie_uid))
            .await
    }

    async fn get_user_by_identity(
        &self,
        letta_identity_id: &str,
    ) -> Result<Option<DbUser>, StoreError> {
        self.select_one("users", &Self::eq("letta_identity_id", letta_identity_id))
            .await
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<DbUser>, StoreError> {
        self.select_one("users", &Self::eq("id", user_id)).await
    }

    // ==================== Agents ====================

    async fn create_agent(&self, agent: &NewAgent) -> Result<DbAgent, StoreError> {
        let rows: Vec<DbAgent> = self.insert("agents", std::slice::from_ref(agent)).await?;
        let created = rows.into_iter().next().ok_or(StoreError::Empty("agent"))?;
        tracing::info!(agent_id = %created.id, "Stored agent metadata in Supabase");
        Ok(created)
    }

    async fn list_agents_for_user(&self, user_id: &str) -> Result<Vec<DbAgent>, StoreError> {
        self.select(
            "agents",
            &format!("select=*&{}&order=created_at.desc", Self::eq("user_id", user_id)),
        )
        .await
    }

    async fn get_agent_by_letta_id(
        &self,
        letta_agent_id: &str,
    ) -> Result<Option<DbAgent>, StoreError> {
        self.select_one("agents", &Self::eq("letta_agent_id", letta_agent_id))
            .await
    }

    async fn get_agent_by_id(&self, agent_id: &str) -> Result<Option<DbAgent>, StoreError> {
        self.select_one("agents", &Self::eq("id", agent_id)).await
    }

    async fn delete_agent_by_letta_id(&self, letta_agent_id: &str) -> Result<(), StoreError> {
        let resp = self
            .authed(self.client.delete(self.table_url(
                "agents",
                &Self::eq("letta_agent_id", letta_agent_id),
            )))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            return Err(StoreError::Status { status, body });
        }

        tracing::info!(letta_agent_id, "Deleted agent metadata from Supabase");
        Ok(())
    }

    // ==================== Messages ====================

    async fn create_message(&self, message: &NewMessage) -> Result<DbMessage, StoreError> {
        let rows: Vec<DbMessage> = self
            .insert("messages", std::slice::from_ref(message))
            .await?;
        rows.into_iter().next().ok_or(StoreError::Empty("message"))
    }

    async fn create_messages(&self, messages: &[NewMessage]) -> Result<Vec<DbMessage>, StoreError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<DbMessage> = self.insert("messages", messages).await?;
        tracing::info!("Stored {} messages in Supabase", rows.len());
        Ok(rows)
    }

    async fn list_messages_for_agent(&self, agent_id: &str) -> Result<Vec<DbMessage>, StoreError> {
        self.select(
            "messages",
            &format!("select=*&{}&order=created_at.asc", Self::eq("agent_id", agent_id)),
        )
        .await
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
