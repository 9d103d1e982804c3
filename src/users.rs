//! User bootstrap across the identity directory and the ownership store.
//!
//! A browser token maps to exactly one stored user, which references one
//! Letta identity. The two writes are not transactional: if the identity is
//! created but the user insert fails, the identity is left behind and reused
//! on the next attempt (it is found by key).

use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::letta::{IdentityDirectory, LettaError};
use crate::store::{DbUser, NewUser, OwnershipStore, StoreError};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("User lookup failed: {0}")]
    Lookup(#[source] StoreError),

    #[error("Identity provisioning failed: {0}")]
    Identity(#[source] LettaError),

    #[error("User creation failed: {0}")]
    CreateUser(#[source] StoreError),
}

/// Ids resolved for a client token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub store_user_id: String,
    pub identity_id: String,
    pub client_token: String,
    pub is_new: bool,
}

impl UserData {
    fn existing(user: DbUser) -> Self {
        Self {
            store_user_id: user.id,
            identity_id: user.letta_identity_id,
            client_token: user.cookie_uid,
            is_new: false,
        }
    }
}

/// Short, stable fingerprint of a client token for log lines.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

/// Friendly identity name derived from the token.
fn display_name(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("User {}", prefix)
}

#[derive(Clone)]
pub struct UserManager {
    identities: Arc<dyn IdentityDirectory>,
    store: Arc<dyn OwnershipStore>,
}

impl UserManager {
    pub fn new(identities: Arc<dyn IdentityDirectory>, store: Arc<dyn OwnershipStore>) -> Self {
        Self { identities, store }
    }

    /// Return the user for `client_token`, creating the identity and the user if needed.
    pub async fn ensure_user(&self, client_token: &str) -> Result<UserData, BootstrapError> {
        if let Some(user) = self
            .store
            .get_user_by_cookie_uid(client_token)
            .await
            .map_err(BootstrapError::Lookup)?
        {
            return Ok(UserData::existing(user));
        }

        let token_fp = fingerprint(client_token);
        tracing::info!(token = %token_fp, "Creating new user");

        let identity = self
            .identities
            .get_or_create_identity(client_token, &display_name(client_token))
            .await
            .map_err(BootstrapError::Identity)?;

        let user = self
            .store
            .create_user(&NewUser {
                cookie_uid: client_token.to_string(),
                letta_identity_id: identity.id.clone(),
                name: identity.name.clone(),
                email: None,
            })
            .await
            .map_err(|e| {
                tracing::warn!(
                    token = %token_fp,
                    identity_id = %identity.id,
                    "Identity exists without a stored user: {}",
                    e
                );
                BootstrapError::CreateUser(e)
            })?;

        tracing::info!(
            user_id = %user.id,
            identity_id = %identity.id,
            "Created new user"
        );

        Ok(UserData {
            store_user_id: user.id,
            identity_id: identity.id,
            client_token: user.cookie_uid,
            is_new: true,
        })
    }

    /// Look up the user for `client_token` without creating anything.
    pub async fn lookup_user(&self, client_token: &str) -> Result<Option<UserData>, StoreError> {
        Ok(self
            .store
            .get_user_by_cookie_uid(client_token)
            .await?
            .map(UserData::existing))
    }

    /// Whether the identity a user references still exists in the directory.
    pub async fn verify_identity(&self, identity_id: &str) -> Result<bool, LettaError> {
        Ok(self.identities.get_identity(identity_id).await?.is_some())
    }
}
