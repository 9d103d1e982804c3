//! Per-request caller identity.
//!
//! In cookie mode every request passes through [`attach_identity`], which
//! reads (or mints) the `letta_uid` cookie, bootstraps the user and stores a
//! [`RequestIdentity`] in the request extensions. Bootstrap failures are
//! logged and the request continues without an identity; handlers that need
//! one reject with 401 through the [`Caller`] extractor.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, Request,
    },
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use super::error::ApiError;
use super::routes::AppState;
use crate::config::IdentityMode;
use crate::users::{fingerprint, UserData};

pub const COOKIE_NAME: &str = "letta_uid";
pub const COOKIE_MAX_AGE_SECS: u64 = 24 * 60 * 60;
const MAX_TOKEN_LEN: usize = 128;

/// Id used for every field of the single-tenant identity.
pub const DEFAULT_IDENTITY: &str = "default";

/// Resolved caller, available to handlers without re-querying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestIdentity {
    pub store_user_id: String,
    pub identity_id: String,
    pub client_token: String,
}

impl RequestIdentity {
    pub fn single_tenant() -> Self {
        Self {
            store_user_id: DEFAULT_IDENTITY.to_string(),
            identity_id: DEFAULT_IDENTITY.to_string(),
            client_token: DEFAULT_IDENTITY.to_string(),
        }
    }
}

impl From<UserData> for RequestIdentity {
    fn from(user: UserData) -> Self {
        Self {
            store_user_id: user.store_user_id,
            identity_id: user.identity_id,
            client_token: user.client_token,
        }
    }
}

fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for raw in headers.get_all(COOKIE) {
        let Ok(raw) = raw.to_str() else { continue };
        for part in raw.split(';') {
            let mut pieces = part.trim().splitn(2, '=');
            let key = pieces.next().unwrap_or("").trim();
            let value = pieces.next().unwrap_or("").trim();
            if key == cookie_name && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Tokens we mint are UUIDs; anything oversized or outside `[A-Za-z0-9_-]` is ignored.
fn is_valid_token(token: &str) -> bool {
    token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn identity_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{COOKIE_NAME}={token}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Middleware: resolve the caller from the `letta_uid` cookie.
pub async fn attach_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if state.config.identity_mode == IdentityMode::SingleTenant {
        return next.run(req).await;
    }

    let (token, minted) = match extract_cookie_value(req.headers(), COOKIE_NAME) {
        Some(token) if is_valid_token(&token) => (token, false),
        _ => (Uuid::new_v4().to_string(), true),
    };

    match state.users.ensure_user(&token).await {
        Ok(user) => {
            if user.is_new {
                tracing::info!(user_id = %user.store_user_id, "New user created");
            }
            req.extensions_mut().insert(RequestIdentity::from(user));
        }
        Err(e) => {
            tracing::error!(token = %fingerprint(&token), "Failed to set up user: {}", e);
        }
    }

    let mut response = next.run(req).await;

    if minted {
        match HeaderValue::from_str(&identity_cookie(&token, state.config.secure_cookies)) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Invalid identity cookie: {}", e),
        }
    }

    response
}

/// The caller's identity; rejects with 401 when none was attached.
///
/// In single-tenant mode this is always the fixed default identity.
#[derive(Debug, Clone)]
pub struct Caller(pub RequestIdentity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match state.config.identity_mode {
            IdentityMode::SingleTenant => Ok(Caller(RequestIdentity::single_tenant())),
            IdentityMode::Cookie => parts
                .extensions
                .get::<RequestIdentity>()
                .cloned()
                .map(Caller)
                .ok_or(ApiError::Unauthorized),
        }
    }
}
