use crate::core::error::FuryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Client not configured: {0}")]
    Configuration(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Chain(#[from] FuryError),
}
