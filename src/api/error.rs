//! HTTP error taxonomy.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
///
/// Upstream failures carry only a generic message; the cause is logged
/// where the error is created.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User authentication required")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    /// Missing, or owned by someone else. The two are deliberately indistinguishable.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Upstream(&'static str),
}

impl ApiError {
    /// Log an upstream failure and reduce it to a generic message.
    pub fn upstream(message: &'static str, cause: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", message, cause);
        Self::Upstream(message)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
