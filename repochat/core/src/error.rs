//! Error Types
//!
//! Two failure domains live here. [`ClientError`] covers everything that can go
//! wrong talking to the backend. [`ChatError`] covers sends that are refused
//! before any request is made (guards, not failures).

use thiserror::Error;

use crate::models::RepoStatus;

/// Errors from backend requests and response decoding
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never completed (connection refused, reset, timeout)
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status code
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// A response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request was rejected client-side before hitting the network
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The response stream failed mid-flight
    #[error("Stream error: {0}")]
    Stream(String),
}

impl ClientError {
    /// Whether this is a 404 from the backend
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Result alias for backend operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Reasons a chat send is refused without touching the conversation
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    /// A previous turn in this conversation is still streaming
    #[error("A response is still streaming for this conversation")]
    TurnInFlight,

    /// The repository has not finished ingestion
    #[error("Repository is not ready for chat (status: {status:?})")]
    RepositoryNotReady {
        /// Last known status, `None` if no status has been fetched yet
        status: Option<RepoStatus>,
    },

    /// The message was empty or whitespace only
    #[error("Message is empty")]
    EmptyMessage,
}
