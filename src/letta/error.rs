//! Error type for agent service calls.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LettaError {
    #[error("Letta request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Letta returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to decode Letta response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Letta stream failed: {0}")]
    Stream(String),
}

impl LettaError {
    /// Whether the agent service reported the target resource as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == reqwest::StatusCode::NOT_FOUND,
            Self::Request(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}
