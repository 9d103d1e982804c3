//! Application state, router assembly and the HTTP server.

use std::sync::Arc;

use axum::middleware;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::agents;
use super::error::ApiError;
use super::identity::{self, Caller};
use crate::config::{Config, IdentityMode};
use crate::letta::{AgentService, IdentityDirectory, LettaClient};
use crate::store::{OwnershipStore, SupabaseClient};
use crate::users::UserManager;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub agents: Arc<dyn AgentService>,
    pub store: Arc<dyn OwnershipStore>,
    /// User bootstrap over the identity directory and `store`
    pub users: UserManager,
}

impl AppState {
    pub fn new(
        config: Config,
        agents: Arc<dyn AgentService>,
        identities: Arc<dyn IdentityDirectory>,
        store: Arc<dyn OwnershipStore>,
    ) -> Self {
        let users = UserManager::new(identities, Arc::clone(&store));
        Self {
            config,
            agents,
            store,
            users,
        }
    }

    /// State backed by the Letta REST API and Supabase.
    pub fn from_config(config: Config) -> Self {
        let letta = Arc::new(LettaClient::new(
            &config.letta_base_url,
            &config.letta_api_key,
        ));
        let store = Arc::new(SupabaseClient::new(
            &config.supabase_url,
            &config.supabase_anon_key,
        ));
        Self::new(config, letta.clone(), letta, store)
    }
}

/// Assemble the router: public health check, everything else behind identity attachment.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/api/health", get(health));

    let identified_routes = Router::new()
        .route("/api/me", get(me))
        .nest("/api/agents", agents::routes())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            identity::attach_identity,
        ));

    Router::new()
        .merge(public_routes)
        .merge(identified_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let mode = config.identity_mode;
    let state = Arc::new(AppState::from_config(config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(identity_mode = mode.as_str(), "Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub identity_mode: String,
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        identity_mode: state.config.identity_mode.as_str().to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub identity_id: String,
    /// Display name from the stored user row.
    pub name: Option<String>,
    /// `None` when the directory was not consulted.
    pub identity_verified: Option<bool>,
}

/// GET /api/me - The caller's resolved identity.
async fn me(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<MeResponse>, ApiError> {
    let name = match state.config.identity_mode {
        IdentityMode::SingleTenant => None,
        IdentityMode::Cookie => state
            .store
            .get_user_by_id(&caller.store_user_id)
            .await
            .map_err(|e| ApiError::upstream("Error fetching user", e))?
            .and_then(|user| user.name),
    };

    let identity_verified = match state.config.identity_mode {
        IdentityMode::SingleTenant => None,
        IdentityMode::Cookie => match state.users.verify_identity(&caller.identity_id).await {
            Ok(found) => {
                if !found {
                    tracing::warn!(
                        user_id = %caller.store_user_id,
                        identity_id = %caller.identity_id,
                        "User references a missing identity"
                    );
                }
                Some(found)
            }
            Err(e) => {
                tracing::warn!("Identity verification failed: {}", e);
                None
            }
        },
    };

    Ok(Json(MeResponse {
        user_id: caller.store_user_id,
        identity_id: caller.identity_id,
        name,
        identity_verified,
    }))
}
